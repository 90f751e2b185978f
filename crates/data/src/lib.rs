//! Persistence for the trading engine.
//!
//! The engine writes every change to tracked positions, live orders, the
//! ledger and the halt flags through the [`StateStore`] trait. Three
//! implementations are provided:
//! - [`FileStateStore`]: a single JSON document, rewritten atomically
//! - [`MemoryStateStore`]: process-local, for tests
//! - [`PgStateStore`]: PostgreSQL via `sqlx`

pub mod file_store;
pub mod memory_store;
pub mod pg_store;
pub mod repositories;
pub mod store;

pub use file_store::FileStateStore;
pub use memory_store::MemoryStateStore;
pub use pg_store::PgStateStore;
pub use store::{PersistedState, StateStore, StoreError};
