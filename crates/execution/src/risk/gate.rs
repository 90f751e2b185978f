use super::RiskConfig;
use ftrade_domain::entities::HaltReason;
use ftrade_domain::enums::Direction;
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request to open a position, built from a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub symbol: Symbol,
    pub direction: Direction,
    /// Suggested notional. `None` is malformed.
    pub size: Option<Decimal>,
    pub confidence: Decimal,
    pub strategy: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approve,
    Reject,
    Reduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    InvalidInput,
    TradingHalted,
    SymbolHalted,
    LowConfidence,
    ExposureLimit,
    DailyLossLimit,
    MaxDrawdown,
    Approved,
    SizeReduced,
}

impl ReasonCode {
    fn for_halt(reason: HaltReason) -> Self {
        match reason {
            HaltReason::DailyLossLimit => ReasonCode::DailyLossLimit,
            HaltReason::MaxDrawdown => ReasonCode::MaxDrawdown,
            _ => ReasonCode::TradingHalted,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::InvalidInput => "INVALID_INPUT",
            ReasonCode::TradingHalted => "TRADING_HALTED",
            ReasonCode::SymbolHalted => "SYMBOL_HALTED",
            ReasonCode::LowConfidence => "LOW_CONFIDENCE",
            ReasonCode::ExposureLimit => "EXPOSURE_LIMIT",
            ReasonCode::DailyLossLimit => "DAILY_LOSS_LIMIT",
            ReasonCode::MaxDrawdown => "MAX_DRAWDOWN",
            ReasonCode::Approved => "APPROVED",
            ReasonCode::SizeReduced => "SIZE_REDUCED",
        };
        f.write_str(s)
    }
}

/// Outcome of one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub verdict: Verdict,
    /// Approved notional; zero on rejection.
    pub approved_size: Decimal,
    pub reason: ReasonCode,
    pub detail: String,
}

impl RiskDecision {
    fn reject(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject,
            approved_size: Decimal::ZERO,
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        !matches!(self.verdict, Verdict::Reject)
    }
}

/// Consistent read of account state taken under the ledger lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSnapshot {
    /// Balance plus unrealized PnL.
    pub equity: Decimal,
    /// Reserved or open notional across all symbols.
    pub exposure: Decimal,
    pub day_start_equity: Decimal,
    pub high_water_mark: Decimal,
    /// Sum of quantity times distance to stop over open positions.
    pub at_risk: Decimal,
    pub account_halt: Option<HaltReason>,
    pub symbol_halt: Option<HaltReason>,
}

impl RiskSnapshot {
    /// Loss since the start of the day as a fraction, floored at zero.
    pub fn daily_loss_pct(&self) -> Decimal {
        if self.day_start_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.day_start_equity - self.equity) / self.day_start_equity).max(Decimal::ZERO)
    }

    /// Decline from the high-water mark as a fraction, floored at zero.
    pub fn drawdown_pct(&self) -> Decimal {
        if self.high_water_mark <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.high_water_mark - self.equity) / self.high_water_mark).max(Decimal::ZERO)
    }

    pub fn exposure_pct(&self) -> Decimal {
        if self.equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.exposure / self.equity
    }

    pub fn position_risk_pct(&self) -> Decimal {
        if self.equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.at_risk / self.equity
    }
}

/// Gate decision plus a halt the caller must latch.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub decision: RiskDecision,
    pub halt: Option<(HaltReason, String)>,
}

impl Assessment {
    fn decided(decision: RiskDecision) -> Self {
        Self {
            decision,
            halt: None,
        }
    }
}

/// Current risk figures for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub equity: Decimal,
    pub drawdown_pct: Decimal,
    pub daily_loss_pct: Decimal,
    pub exposure_pct: Decimal,
    pub position_risk_pct: Decimal,
    /// 0 to 100, higher is riskier.
    pub risk_score: u32,
    pub halted: bool,
}

/// Position risk treated as saturating the score component.
const POSITION_RISK_CEILING: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// The single authority approving, reducing or rejecting proposals.
///
/// The gate is pure: it reads a [`RiskSnapshot`] and returns an
/// [`Assessment`]. Reservations and halt latching are left to the caller,
/// which performs them under the same write lock as the read.
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn assess(&self, proposal: &Proposal, snapshot: &RiskSnapshot) -> Assessment {
        if let Some(problem) = Self::malformed(proposal) {
            return Assessment::decided(RiskDecision::reject(ReasonCode::InvalidInput, problem));
        }

        if let Some(reason) = snapshot.account_halt {
            return Assessment::decided(RiskDecision::reject(
                ReasonCode::for_halt(reason),
                format!("account halted: {reason}"),
            ));
        }
        if let Some(reason) = snapshot.symbol_halt {
            return Assessment::decided(RiskDecision::reject(
                ReasonCode::SymbolHalted,
                format!("{} halted: {reason}", proposal.symbol),
            ));
        }

        // A breach halts the account even when this proposal would fail
        // for another reason.
        if let Some((reason, detail)) = self.check_limits(snapshot) {
            return Assessment {
                decision: RiskDecision::reject(ReasonCode::for_halt(reason), detail.clone()),
                halt: Some((reason, detail)),
            };
        }

        if proposal.confidence < self.config.min_entry_confidence {
            return Assessment::decided(RiskDecision::reject(
                ReasonCode::LowConfidence,
                format!(
                    "confidence {} below {}",
                    proposal.confidence, self.config.min_entry_confidence
                ),
            ));
        }

        let requested = proposal.size.unwrap_or(Decimal::ZERO);
        let max_size = self.max_position_size(snapshot);
        if max_size <= Decimal::ZERO {
            return Assessment::decided(RiskDecision::reject(
                ReasonCode::ExposureLimit,
                format!(
                    "exposure {} leaves no budget under {}",
                    snapshot.exposure, self.config.max_exposure
                ),
            ));
        }

        let decision = if requested > max_size {
            RiskDecision {
                verdict: Verdict::Reduce,
                approved_size: max_size,
                reason: ReasonCode::SizeReduced,
                detail: format!("size {requested} capped to {max_size}"),
            }
        } else {
            RiskDecision {
                verdict: Verdict::Approve,
                approved_size: requested,
                reason: ReasonCode::Approved,
                detail: String::new(),
            }
        };
        Assessment::decided(decision)
    }

    fn malformed(proposal: &Proposal) -> Option<String> {
        if proposal.symbol.is_empty() {
            return Some("missing symbol".to_string());
        }
        match proposal.size {
            None => return Some("missing size".to_string()),
            Some(size) if size <= Decimal::ZERO => {
                return Some(format!("non-positive size {size}"));
            }
            Some(_) => {}
        }
        if proposal.direction == Direction::Flat {
            return Some("flat direction".to_string());
        }
        if proposal.confidence < Decimal::ZERO || proposal.confidence > Decimal::ONE {
            return Some(format!("confidence {} outside [0, 1]", proposal.confidence));
        }
        None
    }

    /// Daily-loss and drawdown check. Returns the halt to latch, if any.
    pub fn check_limits(&self, snapshot: &RiskSnapshot) -> Option<(HaltReason, String)> {
        let daily = snapshot.daily_loss_pct();
        if daily >= self.config.daily_loss_limit.value() {
            return Some((
                HaltReason::DailyLossLimit,
                format!(
                    "daily loss {}% reached limit {}",
                    (daily * Decimal::ONE_HUNDRED).round_dp(2),
                    self.config.daily_loss_limit
                ),
            ));
        }
        let drawdown = snapshot.drawdown_pct();
        if drawdown >= self.config.max_drawdown.value() {
            return Some((
                HaltReason::MaxDrawdown,
                format!(
                    "drawdown {}% reached limit {}",
                    (drawdown * Decimal::ONE_HUNDRED).round_dp(2),
                    self.config.max_drawdown
                ),
            ));
        }
        None
    }

    /// True while `confidence` supports keeping a position open.
    pub fn should_hold(&self, confidence: Decimal) -> bool {
        confidence >= self.config.hold_confidence_floor
    }

    /// `min(per_trade_cap × equity, remaining exposure budget)`.
    pub fn max_position_size(&self, snapshot: &RiskSnapshot) -> Decimal {
        if snapshot.equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let per_trade = self.config.per_trade_cap.of(snapshot.equity);
        let budget = self.config.max_exposure.of(snapshot.equity) - snapshot.exposure;
        per_trade.min(budget).max(Decimal::ZERO)
    }

    /// Weighted risk score: drawdown 40%, daily loss 30%, position risk 30%.
    pub fn metrics(&self, snapshot: &RiskSnapshot) -> RiskMetrics {
        let hundred = Decimal::ONE_HUNDRED;
        let component = |value: Decimal, limit: Decimal| -> Decimal {
            if limit <= Decimal::ZERO {
                return Decimal::ZERO;
            }
            (value / limit * hundred).min(hundred)
        };

        let drawdown = snapshot.drawdown_pct();
        let daily = snapshot.daily_loss_pct();
        let position_risk = snapshot.position_risk_pct();

        let score = component(drawdown, self.config.max_drawdown.value()) * Decimal::new(4, 1)
            + component(daily, self.config.daily_loss_limit.value()) * Decimal::new(3, 1)
            + component(position_risk, POSITION_RISK_CEILING) * Decimal::new(3, 1);

        RiskMetrics {
            equity: snapshot.equity,
            drawdown_pct: drawdown,
            daily_loss_pct: daily,
            exposure_pct: snapshot.exposure_pct(),
            position_risk_pct: position_risk,
            risk_score: score.min(hundred).trunc().to_u32().unwrap_or(0),
            halted: snapshot.account_halt.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default())
    }

    fn snapshot(equity: Decimal) -> RiskSnapshot {
        RiskSnapshot {
            equity,
            exposure: Decimal::ZERO,
            day_start_equity: equity,
            high_water_mark: equity,
            at_risk: Decimal::ZERO,
            account_halt: None,
            symbol_halt: None,
        }
    }

    fn proposal(size: Decimal, confidence: Decimal) -> Proposal {
        Proposal {
            symbol: Symbol::new("BTCUSDT").unwrap(),
            direction: Direction::Long,
            size: Some(size),
            confidence,
            strategy: "momentum".to_string(),
        }
    }

    #[test]
    fn test_size_capped_at_per_trade_cap() {
        let a = gate().assess(&proposal(dec!(1000), dec!(0.85)), &snapshot(dec!(10000)));
        assert_eq!(a.decision.verdict, Verdict::Reduce);
        assert_eq!(a.decision.approved_size, dec!(200));
        assert_eq!(a.decision.reason, ReasonCode::SizeReduced);
        assert!(a.halt.is_none());
    }

    #[test]
    fn test_small_size_approved_unchanged() {
        let a = gate().assess(&proposal(dec!(150), dec!(0.9)), &snapshot(dec!(10000)));
        assert_eq!(a.decision.verdict, Verdict::Approve);
        assert_eq!(a.decision.approved_size, dec!(150));
    }

    #[test]
    fn test_low_confidence_rejected() {
        let a = gate().assess(&proposal(dec!(100), dec!(0.69)), &snapshot(dec!(10000)));
        assert_eq!(a.decision.reason, ReasonCode::LowConfidence);
        assert!(!a.decision.is_approved());
    }

    #[test]
    fn test_malformed_proposals() {
        let g = gate();
        let s = snapshot(dec!(10000));

        let mut missing = proposal(dec!(100), dec!(0.9));
        missing.size = None;
        assert_eq!(g.assess(&missing, &s).decision.reason, ReasonCode::InvalidInput);

        let negative = proposal(dec!(-5), dec!(0.9));
        assert_eq!(g.assess(&negative, &s).decision.reason, ReasonCode::InvalidInput);

        let mut flat = proposal(dec!(100), dec!(0.9));
        flat.direction = Direction::Flat;
        assert_eq!(g.assess(&flat, &s).decision.reason, ReasonCode::InvalidInput);

        let out_of_range = proposal(dec!(100), dec!(1.2));
        assert_eq!(g.assess(&out_of_range, &s).decision.reason, ReasonCode::InvalidInput);
    }

    #[test]
    fn test_exposure_budget_limits_size() {
        let mut s = snapshot(dec!(10000));
        s.exposure = dec!(1900);
        let a = gate().assess(&proposal(dec!(200), dec!(0.9)), &s);
        assert_eq!(a.decision.verdict, Verdict::Reduce);
        assert_eq!(a.decision.approved_size, dec!(100));

        s.exposure = dec!(2000);
        let a = gate().assess(&proposal(dec!(200), dec!(0.9)), &s);
        assert_eq!(a.decision.reason, ReasonCode::ExposureLimit);
    }

    #[test]
    fn test_daily_loss_breach_requests_halt() {
        let mut s = snapshot(dec!(9500));
        s.day_start_equity = dec!(10000);
        s.high_water_mark = dec!(10000);
        let a = gate().assess(&proposal(dec!(100), dec!(0.9)), &s);
        assert_eq!(a.decision.reason, ReasonCode::DailyLossLimit);
        assert_eq!(a.halt.map(|(r, _)| r), Some(HaltReason::DailyLossLimit));
    }

    #[test]
    fn test_drawdown_breach_requests_halt() {
        let mut s = snapshot(dec!(8400));
        s.high_water_mark = dec!(10000);
        let a = gate().assess(&proposal(dec!(100), dec!(0.9)), &s);
        assert_eq!(a.decision.reason, ReasonCode::MaxDrawdown);
        assert_eq!(a.halt.map(|(r, _)| r), Some(HaltReason::MaxDrawdown));
    }

    #[test]
    fn test_halted_account_rejects_with_halt_reason() {
        let g = gate();
        let mut s = snapshot(dec!(10000));
        s.account_halt = Some(HaltReason::DailyLossLimit);
        for confidence in [dec!(0.5), dec!(0.9), dec!(1)] {
            let a = g.assess(&proposal(dec!(100), confidence), &s);
            assert_eq!(a.decision.reason, ReasonCode::DailyLossLimit);
            assert!(!a.decision.is_approved());
        }

        s.account_halt = Some(HaltReason::Manual);
        let a = g.assess(&proposal(dec!(100), dec!(0.9)), &s);
        assert_eq!(a.decision.reason, ReasonCode::TradingHalted);
    }

    #[test]
    fn test_symbol_halt_rejects() {
        let mut s = snapshot(dec!(10000));
        s.symbol_halt = Some(HaltReason::StuckOrder);
        let a = gate().assess(&proposal(dec!(100), dec!(0.9)), &s);
        assert_eq!(a.decision.reason, ReasonCode::SymbolHalted);
    }

    #[test]
    fn test_approved_size_never_exceeds_caps() {
        let g = gate();
        let equity = dec!(10000);
        let mut exposure = Decimal::ZERO;
        for step in 0..20 {
            let mut s = snapshot(equity);
            s.exposure = exposure;
            let requested = Decimal::from(50 + step * 37);
            let a = g.assess(&proposal(requested, dec!(0.8)), &s);
            if a.decision.is_approved() {
                assert!(a.decision.approved_size <= dec!(200));
                exposure += a.decision.approved_size;
            }
            assert!(exposure <= dec!(2000));
        }
    }

    #[test]
    fn test_hold_floor() {
        assert!(gate().should_hold(dec!(0.40)));
        assert!(!gate().should_hold(dec!(0.39)));
    }

    #[test]
    fn test_metrics_score() {
        let mut s = snapshot(dec!(9250));
        s.day_start_equity = dec!(10000);
        s.high_water_mark = dec!(10000);
        s.at_risk = dec!(462.5);
        let m = gate().metrics(&s);
        // drawdown 7.5% of 15% -> 50 * 0.4, daily 7.5% saturates -> 100 * 0.3,
        // position risk 5% of 10% -> 50 * 0.3.
        assert_eq!(m.risk_score, 65);
        assert_eq!(m.drawdown_pct, dec!(0.075));
    }
}
