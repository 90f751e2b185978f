use ftrade_domain::entities::{Signal, Snapshot};
use ftrade_domain::enums::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Indicator used as the grid center when present.
pub const GRID_CENTER: &str = "sma";

/// Grid parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Total levels, split evenly above and below the center.
    pub levels: u32,
    /// Spacing between levels as a fraction of the center price.
    pub distance: Decimal,
    /// Candles required before the grid is laid out.
    pub min_candles: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            levels: 10,
            distance: Decimal::new(1, 2), // 1%
            min_candles: 20,
        }
    }
}

/// Buy and sell levels around a center price.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLevels {
    pub center: Decimal,
    pub step: Decimal,
    pub buy_levels: Vec<Decimal>,
    pub sell_levels: Vec<Decimal>,
}

/// Mean-reversion grid: buys once price has crossed a level below the
/// center, sells once it has crossed a level above. Grid positions are never
/// closed on signal reversal.
#[derive(Debug, Clone, Default)]
pub struct GridStrategy {
    config: GridConfig,
}

impl GridStrategy {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn levels(&self, center: Decimal) -> GridLevels {
        let step = center * self.config.distance;
        let half = self.config.levels / 2;
        let buy_levels = (1..=half).map(|i| center - step * Decimal::from(i)).collect();
        let sell_levels = (1..=half).map(|i| center + step * Decimal::from(i)).collect();
        GridLevels {
            center,
            step,
            buy_levels,
            sell_levels,
        }
    }

    fn center(&self, snapshot: &Snapshot) -> Option<Decimal> {
        if let Some(sma) = snapshot.indicator(GRID_CENTER) {
            return Some(sma);
        }
        let window = &snapshot.candles[snapshot.candles.len().saturating_sub(self.config.min_candles)..];
        if window.is_empty() {
            return None;
        }
        let sum: Decimal = window.iter().map(|c| c.close).sum();
        Some(sum / Decimal::from(window.len()))
    }

    pub fn propose(&self, snapshot: &Snapshot, source: &str) -> Signal {
        let flat = Signal::flat(snapshot.symbol.clone(), source).with_timestamp(snapshot.timestamp);
        if snapshot.candles.len() < self.config.min_candles || self.config.levels < 2 {
            return flat;
        }
        let (Some(center), Some(price)) = (self.center(snapshot), snapshot.last_price()) else {
            return flat;
        };
        let grid = self.levels(center);
        if grid.step <= Decimal::ZERO {
            return flat;
        }

        // Signed number of levels crossed.
        let offset = (price - center) / grid.step;
        let direction = if offset <= -Decimal::ONE {
            Direction::Long
        } else if offset >= Decimal::ONE {
            Direction::Short
        } else {
            return flat;
        };

        let half = Decimal::from(self.config.levels / 2);
        Signal {
            symbol: snapshot.symbol.clone(),
            direction,
            confidence: (offset.abs() / half).min(Decimal::ONE),
            timestamp: snapshot.timestamp,
            source: source.to_string(),
        }
    }
}
