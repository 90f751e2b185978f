//! Prelude module for convenient imports.
//!
//! # Example
//!
//! ```rust
//! use ftrade_domain::prelude::*;
//! ```

pub use crate::entities::{
    Candle, ExchangeOrderId, ExitLevels, FillOutcome, HaltReason, HaltRecord, HaltState,
    LedgerEntry, LedgerEntryKind, Order, OrderId, OrderStatus, Position, PositionId, Signal,
    Snapshot,
};
pub use crate::enums::{
    CloseReason, Direction, OrderPurpose, OrderSide, OrderType, PositionSide, PositionState,
    Timeframe,
};
pub use crate::error::DomainError;
pub use crate::value_objects::{Percentage, Symbol, TrailingStop};
