pub mod halt;
pub mod ledger_entry;
pub mod order;
pub mod position;
pub mod signal;
pub mod snapshot;

// Re-export for easier access
pub use halt::{HaltReason, HaltRecord, HaltState};
pub use ledger_entry::{LedgerEntry, LedgerEntryKind};
pub use order::{ExchangeOrderId, FillOutcome, Order, OrderId, OrderStatus};
pub use position::{ExitLevels, Position, PositionId};
pub use signal::Signal;
pub use snapshot::{Candle, Snapshot};
