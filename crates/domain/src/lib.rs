//! Core data model for the futures trading engine.
//!
//! Market snapshots, signals, positions, orders and ledger entries, plus
//! the value objects they are built from.

pub mod entities;
pub mod enums;
pub mod error;
pub mod prelude;
pub mod value_objects;
