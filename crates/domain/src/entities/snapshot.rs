use crate::enums::Timeframe;
use crate::value_objects::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Market view for one symbol at one tick: OHLCV history plus indicator
/// values. Never mutated after construction; shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub candles: Vec<Candle>,
    pub indicators: BTreeMap<String, Decimal>,
}

impl Snapshot {
    pub fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        candles: Vec<Candle>,
        indicators: BTreeMap<String, Decimal>,
    ) -> Self {
        let timestamp = candles.last().map(|c| c.timestamp).unwrap_or_else(Utc::now);
        Self {
            symbol,
            timeframe,
            timestamp,
            candles,
            indicators,
        }
    }

    /// Close of the most recent candle.
    pub fn last_price(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }

    pub fn last_volume(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.volume)
    }

    pub fn indicator(&self, name: &str) -> Option<Decimal> {
        self.indicators.get(name).copied()
    }
}
