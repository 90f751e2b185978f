use crate::enums::PositionSide;
use crate::value_objects::percentage::Percentage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trailing stop that follows the best price seen since entry.
///
/// The stop stays unarmed until price has moved `activation_pct` in the
/// position's favor. Once armed it only ever tightens: upward for longs,
/// downward for shorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub distance_pct: Percentage,
    pub activation_pct: Percentage,
    pub best_price: Decimal,
    pub stop: Option<Decimal>,
}

impl TrailingStop {
    pub fn new(
        side: PositionSide,
        entry_price: Decimal,
        distance_pct: Percentage,
        activation_pct: Percentage,
    ) -> Self {
        Self {
            side,
            entry_price,
            distance_pct,
            activation_pct,
            best_price: entry_price,
            stop: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.stop.is_some()
    }

    /// Feeds a new mark price. Returns the stop level after the update.
    pub fn ratchet(&mut self, price: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return self.stop;
        }

        let improved = match self.side {
            PositionSide::Long => price > self.best_price,
            PositionSide::Short => price < self.best_price,
        };
        if improved {
            self.best_price = price;
        }

        let favorable_move = match self.side {
            PositionSide::Long => (self.best_price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - self.best_price) / self.entry_price,
        };
        if favorable_move < self.activation_pct.value() {
            return self.stop;
        }

        let candidate = match self.side {
            PositionSide::Long => self.best_price * (Decimal::ONE - self.distance_pct.value()),
            PositionSide::Short => self.best_price * (Decimal::ONE + self.distance_pct.value()),
        };

        self.stop = Some(match (self.side, self.stop) {
            (_, None) => candidate,
            (PositionSide::Long, Some(current)) => current.max(candidate),
            (PositionSide::Short, Some(current)) => current.min(candidate),
        });
        self.stop
    }

    /// True when `price` has crossed an armed stop.
    pub fn is_triggered(&self, price: Decimal) -> bool {
        match (self.side, self.stop) {
            (PositionSide::Long, Some(stop)) => price <= stop,
            (PositionSide::Short, Some(stop)) => price >= stop,
            (_, None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_stop() -> TrailingStop {
        TrailingStop::new(
            PositionSide::Long,
            dec!(100),
            Percentage::new(dec!(0.015)),
            Percentage::new(dec!(0.01)),
        )
    }

    #[test]
    fn test_unarmed_until_activation() {
        let mut ts = long_stop();
        assert_eq!(ts.ratchet(dec!(100.5)), None);
        assert!(!ts.is_triggered(dec!(90)));

        assert_eq!(ts.ratchet(dec!(101)), Some(dec!(99.485)));
        assert!(ts.is_armed());
    }

    #[test]
    fn test_long_stop_is_monotonic() {
        let mut ts = long_stop();
        let path = [
            dec!(101),
            dec!(104),
            dec!(102),
            dec!(99),
            dec!(106),
            dec!(103),
            dec!(80),
            dec!(107),
        ];

        let mut previous: Option<Decimal> = None;
        for price in path {
            let stop = ts.ratchet(price);
            if let (Some(prev), Some(now)) = (previous, stop) {
                assert!(now >= prev, "stop loosened from {prev} to {now}");
            }
            previous = stop.or(previous);
        }
        assert_eq!(ts.best_price, dec!(107));
    }

    #[test]
    fn test_short_stop_is_monotonic_and_triggers() {
        let mut ts = TrailingStop::new(
            PositionSide::Short,
            dec!(100),
            Percentage::new(dec!(0.02)),
            Percentage::new(dec!(0.01)),
        );

        assert_eq!(ts.ratchet(dec!(98)), Some(dec!(99.96)));
        let after_bounce = ts.ratchet(dec!(99));
        assert_eq!(after_bounce, Some(dec!(99.96)));
        let tighter = ts.ratchet(dec!(95));
        assert_eq!(tighter, Some(dec!(96.90)));
        assert!(!ts.is_triggered(dec!(96)));
        assert!(ts.is_triggered(dec!(97)));
    }
}
