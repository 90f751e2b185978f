use super::AlertThresholds;
use ftrade_domain::entities::ExitLevels;
use ftrade_domain::value_objects::Percentage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Risk limits and exit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Minimum signal confidence to open a position.
    pub min_entry_confidence: Decimal,
    /// Confidence below which an open position is closed.
    pub hold_confidence_floor: Decimal,
    /// Largest single position as a fraction of equity.
    pub per_trade_cap: Percentage,
    /// Largest aggregate notional as a fraction of equity.
    pub max_exposure: Percentage,
    /// Loss since the start of the UTC day that halts trading.
    pub daily_loss_limit: Percentage,
    /// Decline from the equity high-water mark that halts trading.
    pub max_drawdown: Percentage,
    pub stop_loss: Percentage,
    pub take_profit: Percentage,
    pub trailing_distance: Percentage,
    /// Favorable move required before the trailing stop arms.
    pub trailing_activation: Percentage,
    /// Warning thresholds below the halting limits.
    pub alerts: AlertThresholds,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_entry_confidence: Decimal::new(70, 2),
            hold_confidence_floor: Decimal::new(40, 2),
            per_trade_cap: Percentage::new(Decimal::new(2, 2)),           // 2%
            max_exposure: Percentage::new(Decimal::new(20, 2)),           // 20%
            daily_loss_limit: Percentage::new(Decimal::new(5, 2)),        // 5%
            max_drawdown: Percentage::new(Decimal::new(15, 2)),           // 15%
            stop_loss: Percentage::new(Decimal::new(2, 2)),               // 2%
            take_profit: Percentage::new(Decimal::new(4, 2)),             // 4%
            trailing_distance: Percentage::new(Decimal::new(15, 3)),      // 1.5%
            trailing_activation: Percentage::new(Decimal::new(1, 2)),     // 1%
            alerts: AlertThresholds::default(),
        }
    }
}

impl RiskConfig {
    /// Exit levels armed on every newly opened position.
    pub fn exit_levels(&self) -> ExitLevels {
        ExitLevels {
            stop_loss_pct: self.stop_loss,
            take_profit_pct: self.take_profit,
            trailing_distance_pct: self.trailing_distance,
            trailing_activation_pct: self.trailing_activation,
        }
    }

    /// Checks every limit is a fraction in `(0, 1]` and the confidence
    /// thresholds are ordered.
    pub fn validate(&self) -> Result<(), String> {
        let limits = [
            ("per_trade_cap", self.per_trade_cap),
            ("max_exposure", self.max_exposure),
            ("daily_loss_limit", self.daily_loss_limit),
            ("max_drawdown", self.max_drawdown),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
            ("trailing_distance", self.trailing_distance),
            ("trailing_activation", self.trailing_activation),
        ];
        for (name, pct) in limits {
            if !pct.is_valid_limit() {
                return Err(format!("risk.{name} must be in (0, 1], got {}", pct.value()));
            }
        }

        let unit = Decimal::ZERO..=Decimal::ONE;
        if !unit.contains(&self.min_entry_confidence) || !unit.contains(&self.hold_confidence_floor)
        {
            return Err("confidence thresholds must be in [0, 1]".to_string());
        }
        if self.hold_confidence_floor > self.min_entry_confidence {
            return Err(format!(
                "hold_confidence_floor {} exceeds min_entry_confidence {}",
                self.hold_confidence_floor, self.min_entry_confidence
            ));
        }
        if self.per_trade_cap > self.max_exposure {
            return Err("per_trade_cap exceeds max_exposure".to_string());
        }

        let alerts = &self.alerts;
        if alerts.drawdown_warning <= Percentage::ZERO || alerts.drawdown_warning >= self.max_drawdown {
            return Err(format!(
                "risk.alerts.drawdown_warning must be in (0, {})",
                self.max_drawdown.value()
            ));
        }
        if alerts.daily_loss_warning <= Percentage::ZERO
            || alerts.daily_loss_warning >= self.daily_loss_limit
        {
            return Err(format!(
                "risk.alerts.daily_loss_warning must be in (0, {})",
                self.daily_loss_limit.value()
            ));
        }
        if alerts.critical_risk_score > 100 {
            return Err("risk.alerts.critical_risk_score must be at most 100".to_string());
        }
        Ok(())
    }
}
