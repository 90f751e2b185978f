//! Domain-level errors.

use crate::entities::order::OrderStatus;
use rust_decimal::Decimal;

/// Errors raised when constructing or mutating domain objects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// Confidence outside the closed unit interval.
    #[error("confidence {0} outside [0, 1]")]
    InvalidConfidence(Decimal),
    /// Order state change not allowed by the order state machine.
    #[error("invalid order transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
    /// Fill would exceed the order's remaining quantity.
    #[error("fill of {fill} exceeds remaining quantity {remaining}")]
    Overfill {
        /// Fill quantity reported.
        fill: Decimal,
        /// Quantity still open on the order.
        remaining: Decimal,
    },
    /// Quantity or price that must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    NonPositive {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: Decimal,
    },
    /// Symbol string was empty.
    #[error("symbol must not be empty")]
    EmptySymbol,
    /// Unsupported timeframe label.
    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
}
