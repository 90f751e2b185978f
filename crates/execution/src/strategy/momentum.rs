use ftrade_domain::entities::{Signal, Snapshot};
use ftrade_domain::enums::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Indicator keys read from the snapshot.
pub const RSI: &str = "rsi";
pub const EMA_FAST: &str = "ema_fast";
pub const EMA_SLOW: &str = "ema_slow";
pub const VOLUME_SMA: &str = "volume_sma";
pub const BB_UPPER: &str = "bb_upper";
pub const BB_MIDDLE: &str = "bb_middle";

/// Momentum scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// Candles required before any score is produced.
    pub min_candles: usize,
    pub rsi_overbought: Decimal,
    pub rsi_oversold: Decimal,
    /// Volume over its average above which the score is amplified.
    pub volume_boost_ratio: Decimal,
    /// Absolute score needed for a directional signal.
    pub entry_threshold: Decimal,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            min_candles: 10,
            rsi_overbought: Decimal::from(70),
            rsi_oversold: Decimal::from(30),
            volume_boost_ratio: Decimal::new(12, 1), // 1.2x
            entry_threshold: Decimal::from(30),
        }
    }
}

/// Scores RSI, EMA trend, volume and Bollinger position into `[-100, 100]`.
#[derive(Debug, Clone, Default)]
pub struct MomentumStrategy {
    config: MomentumConfig,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    /// Momentum score, zero when history is too short.
    pub fn score(&self, snapshot: &Snapshot) -> Decimal {
        if snapshot.candles.len() < self.config.min_candles {
            return Decimal::ZERO;
        }

        let thirty = Decimal::from(30);
        let mut score = Decimal::ZERO;

        if let Some(rsi) = snapshot.indicator(RSI) {
            score += if rsi > self.config.rsi_overbought {
                -thirty
            } else if rsi < self.config.rsi_oversold {
                thirty
            } else {
                (Decimal::from(50) - rsi) * Decimal::new(4, 1)
            };
        }

        if let (Some(fast), Some(slow)) = (snapshot.indicator(EMA_FAST), snapshot.indicator(EMA_SLOW))
            && !slow.is_zero()
        {
            let diff_pct = (fast - slow) / slow * Decimal::ONE_HUNDRED;
            score += (diff_pct * Decimal::TEN).clamp(-thirty, thirty);
        }

        if let (Some(avg), Some(volume)) = (snapshot.indicator(VOLUME_SMA), snapshot.last_volume())
            && !avg.is_zero()
            && volume / avg > self.config.volume_boost_ratio
        {
            score *= Decimal::new(12, 1);
        }

        if let (Some(upper), Some(middle), Some(close)) = (
            snapshot.indicator(BB_UPPER),
            snapshot.indicator(BB_MIDDLE),
            snapshot.last_price(),
        ) && upper != middle
        {
            let band_position = (close - middle) / (upper - middle);
            let edge = Decimal::new(8, 1);
            if band_position > edge {
                score -= Decimal::from(20);
            } else if band_position < -edge {
                score += Decimal::from(20);
            }
        }

        score.clamp(-Decimal::ONE_HUNDRED, Decimal::ONE_HUNDRED)
    }

    pub fn propose(&self, snapshot: &Snapshot, source: &str) -> Signal {
        let score = self.score(snapshot);
        let direction = if score > self.config.entry_threshold {
            Direction::Long
        } else if score < -self.config.entry_threshold {
            Direction::Short
        } else {
            Direction::Flat
        };

        Signal {
            symbol: snapshot.symbol.clone(),
            direction,
            confidence: score.abs() / Decimal::ONE_HUNDRED,
            timestamp: snapshot.timestamp,
            source: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ftrade_domain::entities::Candle;
    use ftrade_domain::enums::Timeframe;
    use ftrade_domain::value_objects::Symbol;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn snapshot(candles: usize, close: Decimal, indicators: &[(&str, Decimal)]) -> Snapshot {
        let now = Utc::now();
        let candles = (0..candles)
            .map(|_| Candle {
                timestamp: now,
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(100),
            })
            .collect();
        let indicators: BTreeMap<String, Decimal> = indicators
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        Snapshot::new(Symbol::new("BTCUSDT").unwrap(), Timeframe::M15, candles, indicators)
    }

    #[test]
    fn test_short_history_is_flat() {
        let s = MomentumStrategy::default();
        let snap = snapshot(5, dec!(100), &[(RSI, dec!(10))]);
        let signal = s.propose(&snap, "momentum");
        assert_eq!(signal.direction, Direction::Flat);
        assert_eq!(signal.confidence, Decimal::ZERO);
    }

    #[test]
    fn test_oversold_uptrend_goes_long() {
        let s = MomentumStrategy::default();
        // rsi +30, ema diff 4% capped at +30, volume 100/80 boosts by 1.2
        let snap = snapshot(
            20,
            dec!(100),
            &[
                (RSI, dec!(25)),
                (EMA_FAST, dec!(104)),
                (EMA_SLOW, dec!(100)),
                (VOLUME_SMA, dec!(80)),
            ],
        );
        assert_eq!(s.score(&snap), dec!(72));

        let signal = s.propose(&snap, "momentum");
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.confidence, dec!(0.72));
    }

    #[test]
    fn test_overbought_near_upper_band_goes_short() {
        let s = MomentumStrategy::default();
        let snap = snapshot(
            20,
            dec!(109),
            &[
                (RSI, dec!(80)),
                (EMA_FAST, dec!(99)),
                (EMA_SLOW, dec!(100)),
                (BB_UPPER, dec!(110)),
                (BB_MIDDLE, dec!(100)),
            ],
        );
        // -30 rsi, -10 ema, -20 band
        assert_eq!(s.score(&snap), dec!(-60));
        assert_eq!(s.propose(&snap, "momentum").direction, Direction::Short);
    }

    #[test]
    fn test_neutral_rsi_is_linear() {
        let s = MomentumStrategy::default();
        let snap = snapshot(10, dec!(100), &[(RSI, dec!(40))]);
        assert_eq!(s.score(&snap), dec!(4));
        assert_eq!(s.propose(&snap, "momentum").direction, Direction::Flat);
    }

    #[test]
    fn test_all_bullish_components_stack() {
        let s = MomentumStrategy::default();
        let snap = snapshot(
            20,
            dec!(90),
            &[
                (RSI, dec!(10)),
                (EMA_FAST, dec!(110)),
                (EMA_SLOW, dec!(100)),
                (VOLUME_SMA, dec!(10)),
                (BB_UPPER, dec!(110)),
                (BB_MIDDLE, dec!(100)),
            ],
        );
        // (30 + 30) * 1.2 + 20
        assert_eq!(s.score(&snap), dec!(92));
        assert_eq!(s.propose(&snap, "momentum").confidence, dec!(0.92));
    }
}
