//! Mock signal sources standing in for a model service.

use async_trait::async_trait;
use ftrade_domain::entities::{Signal, Snapshot};
use ftrade_domain::enums::Direction;
use ftrade_execution::error::SignalError;
use ftrade_execution::ports::SignalSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Emits random directions with confidence drawn from
/// `[min_confidence, 1)`.
pub struct RandomSignalSource {
    rng: Mutex<StdRng>,
    min_confidence: f64,
    /// Chance of a flat signal.
    flat_probability: f64,
}

impl RandomSignalSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            min_confidence: 0.5,
            flat_probability: 0.2,
        }
    }

    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_flat_probability(mut self, probability: f64) -> Self {
        self.flat_probability = probability.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl SignalSource for RandomSignalSource {
    fn name(&self) -> &str {
        "random"
    }

    async fn generate_signal(&self, snapshot: &Snapshot) -> Result<Signal, SignalError> {
        let mut rng = self.rng.lock().await;
        let direction = if rng.random_bool(self.flat_probability) {
            Direction::Flat
        } else if rng.random_bool(0.5) {
            Direction::Long
        } else {
            Direction::Short
        };
        let draw = rng.random_range(self.min_confidence..=1.0);
        let confidence = Decimal::from_f64(draw)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2)
            .min(Decimal::ONE);
        Ok(Signal::new(snapshot.symbol.clone(), direction, confidence, self.name())?)
    }
}

/// Answers with whatever direction and confidence were last set.
pub struct FixedSignalSource {
    next: Mutex<(Direction, Decimal)>,
    failing: AtomicBool,
}

impl FixedSignalSource {
    pub fn new(direction: Direction, confidence: Decimal) -> Self {
        Self {
            next: Mutex::new((direction, confidence)),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn set(&self, direction: Direction, confidence: Decimal) {
        *self.next.lock().await = (direction, confidence);
    }

    /// Makes every call fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalSource for FixedSignalSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate_signal(&self, snapshot: &Snapshot) -> Result<Signal, SignalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SignalError::Unavailable("signal service offline".to_string()));
        }
        let (direction, confidence) = *self.next.lock().await;
        Ok(Signal::new(snapshot.symbol.clone(), direction, confidence, self.name())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftrade_domain::enums::Timeframe;
    use ftrade_domain::value_objects::Symbol;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        Snapshot::new(
            Symbol::new("BTCUSDT").unwrap(),
            Timeframe::M15,
            vec![],
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_random_signals_stay_in_range() {
        let source = RandomSignalSource::new(42).with_min_confidence(0.7);
        let mut directions = std::collections::HashSet::new();
        for _ in 0..200 {
            let signal = source.generate_signal(&snapshot()).await.unwrap();
            assert!(signal.confidence >= dec!(0.7) && signal.confidence <= Decimal::ONE);
            assert_eq!(signal.source, "random");
            directions.insert(signal.direction);
        }
        assert_eq!(directions.len(), 3);
    }

    #[tokio::test]
    async fn test_never_flat_when_probability_zero() {
        let source = RandomSignalSource::new(1).with_flat_probability(0.0);
        for _ in 0..50 {
            let signal = source.generate_signal(&snapshot()).await.unwrap();
            assert_ne!(signal.direction, Direction::Flat);
        }
    }

    #[tokio::test]
    async fn test_fixed_source() {
        let source = FixedSignalSource::new(Direction::Long, dec!(0.85));
        let signal = source.generate_signal(&snapshot()).await.unwrap();
        assert_eq!((signal.direction, signal.confidence), (Direction::Long, dec!(0.85)));

        source.set(Direction::Short, dec!(0.9)).await;
        assert_eq!(
            source.generate_signal(&snapshot()).await.unwrap().direction,
            Direction::Short
        );

        source.set_failing(true);
        assert!(source.generate_signal(&snapshot()).await.is_err());

        source.set(Direction::Long, dec!(1.5)).await;
        source.set_failing(false);
        assert!(matches!(
            source.generate_signal(&snapshot()).await,
            Err(SignalError::Invalid(_))
        ));
    }
}
