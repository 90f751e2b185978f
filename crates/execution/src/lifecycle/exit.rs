//! Exit-condition evaluation for open positions.

use ftrade_domain::entities::{Position, Signal};
use ftrade_domain::enums::{CloseReason, PositionSide};
use rust_decimal::Decimal;

/// Soft exits driven by the latest signal.
#[derive(Debug, Clone, Copy)]
pub struct SignalExit<'a> {
    pub signal: &'a Signal,
    /// Confidence needed to keep holding.
    pub hold_floor: Decimal,
}

/// Ratchets the trailing stop to `price`, then returns the first exit that
/// applies: stop-loss, take-profit, trailing stop, confidence floor, signal
/// reversal.
pub fn evaluate_exit(
    position: &mut Position,
    price: Decimal,
    signal: Option<SignalExit<'_>>,
) -> Option<CloseReason> {
    if let Some(trailing) = position.trailing.as_mut() {
        trailing.ratchet(price);
    }

    let long = position.side == PositionSide::Long;

    if let Some(stop) = position.stop_loss {
        let hit = if long { price <= stop } else { price >= stop };
        if hit {
            return Some(CloseReason::StopLoss);
        }
    }
    if let Some(target) = position.take_profit {
        let hit = if long { price >= target } else { price <= target };
        if hit {
            return Some(CloseReason::TakeProfit);
        }
    }
    if position
        .trailing
        .as_ref()
        .is_some_and(|t| t.is_triggered(price))
    {
        return Some(CloseReason::TrailingStop);
    }

    let exit = signal?;
    if exit.signal.confidence < exit.hold_floor {
        return Some(CloseReason::ConfidenceFloor);
    }
    if position.side.direction().opposite() == Some(exit.signal.direction) {
        return Some(CloseReason::SignalReversal);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftrade_domain::entities::ExitLevels;
    use ftrade_domain::enums::Direction;
    use ftrade_domain::value_objects::{Percentage, Symbol};
    use rust_decimal_macros::dec;

    fn open(side: PositionSide) -> Position {
        let mut p = Position::opening(
            Symbol::new("BTCUSDT").unwrap(),
            side,
            "momentum",
            dec!(100),
            dec!(1),
            dec!(0.8),
        );
        p.apply_entry_fill(dec!(1), dec!(100));
        p.arm_exits(&ExitLevels {
            stop_loss_pct: Percentage::new(dec!(0.02)),
            take_profit_pct: Percentage::new(dec!(0.04)),
            trailing_distance_pct: Percentage::new(dec!(0.015)),
            trailing_activation_pct: Percentage::new(dec!(0.01)),
        });
        p
    }

    fn signal(direction: Direction, confidence: Decimal) -> Signal {
        Signal::new(Symbol::new("BTCUSDT").unwrap(), direction, confidence, "test").unwrap()
    }

    fn with_floor(signal: &Signal) -> Option<SignalExit<'_>> {
        Some(SignalExit {
            signal,
            hold_floor: dec!(0.40),
        })
    }

    #[test]
    fn test_stop_loss_beats_signal_reversal() {
        let mut p = open(PositionSide::Long);
        let reversal = signal(Direction::Short, dec!(0.95));
        assert_eq!(
            evaluate_exit(&mut p, dec!(97.5), with_floor(&reversal)),
            Some(CloseReason::StopLoss)
        );
    }

    #[test]
    fn test_take_profit() {
        let mut p = open(PositionSide::Short);
        assert_eq!(evaluate_exit(&mut p, dec!(95), None), Some(CloseReason::TakeProfit));
    }

    #[test]
    fn test_trailing_stop_after_favorable_move() {
        let mut p = open(PositionSide::Long);
        assert_eq!(evaluate_exit(&mut p, dec!(103), None), None);
        // Stop sits at 103 * 0.985 = 101.455.
        assert_eq!(
            evaluate_exit(&mut p, dec!(101.4), None),
            Some(CloseReason::TrailingStop)
        );
    }

    #[test]
    fn test_trailing_beats_confidence_floor() {
        let mut p = open(PositionSide::Long);
        evaluate_exit(&mut p, dec!(103), None);
        let weak = signal(Direction::Long, dec!(0.1));
        assert_eq!(
            evaluate_exit(&mut p, dec!(101), with_floor(&weak)),
            Some(CloseReason::TrailingStop)
        );
    }

    #[test]
    fn test_confidence_floor_beats_reversal() {
        let mut p = open(PositionSide::Long);
        let weak_reversal = signal(Direction::Short, dec!(0.3));
        assert_eq!(
            evaluate_exit(&mut p, dec!(100), with_floor(&weak_reversal)),
            Some(CloseReason::ConfidenceFloor)
        );
    }

    #[test]
    fn test_reversal_and_hold() {
        let mut p = open(PositionSide::Short);
        let same = signal(Direction::Short, dec!(0.8));
        assert_eq!(evaluate_exit(&mut p, dec!(100), with_floor(&same)), None);

        let reversal = signal(Direction::Long, dec!(0.8));
        assert_eq!(
            evaluate_exit(&mut p, dec!(100), with_floor(&reversal)),
            Some(CloseReason::SignalReversal)
        );
    }
}
