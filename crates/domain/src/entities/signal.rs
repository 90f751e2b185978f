use crate::enums::Direction;
use crate::error::DomainError;
use crate::value_objects::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Directional recommendation with a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub direction: Direction,
    pub confidence: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Name of whatever produced the signal (strategy or model).
    pub source: String,
}

impl Signal {
    pub fn new(
        symbol: Symbol,
        direction: Direction,
        confidence: Decimal,
        source: impl Into<String>,
    ) -> Result<Self, DomainError> {
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(DomainError::InvalidConfidence(confidence));
        }
        Ok(Self {
            symbol,
            direction,
            confidence,
            timestamp: Utc::now(),
            source: source.into(),
        })
    }

    /// A neutral signal carrying no conviction.
    pub fn flat(symbol: Symbol, source: impl Into<String>) -> Self {
        Self {
            symbol,
            direction: Direction::Flat,
            confidence: Decimal::ZERO,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
