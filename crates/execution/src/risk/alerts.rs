use super::RiskMetrics;
use ftrade_domain::value_objects::Percentage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Warning levels that sit below the halting limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Drawdown from the high-water mark that raises a warning.
    pub drawdown_warning: Percentage,
    /// Daily loss that raises a warning.
    pub daily_loss_warning: Percentage,
    /// Risk score (0 to 100) treated as critical.
    pub critical_risk_score: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            drawdown_warning: Percentage::new(Decimal::new(10, 2)),  // 10%
            daily_loss_warning: Percentage::new(Decimal::new(3, 2)), // 3%
            critical_risk_score: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskAlertKind {
    HighDrawdown,
    HighDailyLoss,
    CriticalRiskScore,
}

impl fmt::Display for RiskAlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskAlertKind::HighDrawdown => "HIGH_DRAWDOWN",
            RiskAlertKind::HighDailyLoss => "HIGH_DAILY_LOSS",
            RiskAlertKind::CriticalRiskScore => "CRITICAL_RISK_SCORE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// A risk figure crossed its warning threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: RiskAlertKind,
    pub level: AlertLevel,
    /// Observed value; fractions for drawdown and daily loss.
    pub value: Decimal,
    pub threshold: Decimal,
    pub message: String,
}

/// Tracks which alerts are raised so each fires once per excursion.
///
/// An alert is raised when its figure goes strictly above the threshold and
/// re-arms once the figure is back at or below it.
#[derive(Debug, Clone, Default)]
pub struct RiskAlerts {
    active: BTreeSet<RiskAlertKind>,
}

impl RiskAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, kind: RiskAlertKind) -> bool {
        self.active.contains(&kind)
    }

    /// Returns the alerts newly raised by `metrics`.
    pub fn evaluate(&mut self, thresholds: &AlertThresholds, metrics: &RiskMetrics) -> Vec<RiskAlert> {
        let hundred = Decimal::ONE_HUNDRED;
        let checks = [
            (
                RiskAlertKind::HighDrawdown,
                AlertLevel::Warning,
                metrics.drawdown_pct,
                thresholds.drawdown_warning.value(),
                format!("drawdown at {}%", (metrics.drawdown_pct * hundred).round_dp(2)),
            ),
            (
                RiskAlertKind::HighDailyLoss,
                AlertLevel::Warning,
                metrics.daily_loss_pct,
                thresholds.daily_loss_warning.value(),
                format!("daily loss at {}%", (metrics.daily_loss_pct * hundred).round_dp(2)),
            ),
            (
                RiskAlertKind::CriticalRiskScore,
                AlertLevel::Critical,
                Decimal::from(metrics.risk_score),
                Decimal::from(thresholds.critical_risk_score),
                format!("risk score {}/100", metrics.risk_score),
            ),
        ];

        let mut raised = Vec::new();
        for (kind, level, value, threshold, message) in checks {
            if value > threshold {
                if self.active.insert(kind) {
                    raised.push(RiskAlert {
                        kind,
                        level,
                        value,
                        threshold,
                        message,
                    });
                }
            } else {
                self.active.remove(&kind);
            }
        }
        raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metrics(drawdown: Decimal, daily: Decimal, score: u32) -> RiskMetrics {
        RiskMetrics {
            equity: dec!(10000),
            drawdown_pct: drawdown,
            daily_loss_pct: daily,
            exposure_pct: Decimal::ZERO,
            position_risk_pct: Decimal::ZERO,
            risk_score: score,
            halted: false,
        }
    }

    #[test]
    fn test_quiet_metrics_raise_nothing() {
        let mut alerts = RiskAlerts::new();
        let thresholds = AlertThresholds::default();
        assert!(alerts.evaluate(&thresholds, &metrics(dec!(0.10), dec!(0.03), 80)).is_empty());
    }

    #[test]
    fn test_alert_fires_once_until_cleared() {
        let mut alerts = RiskAlerts::new();
        let thresholds = AlertThresholds::default();

        let raised = alerts.evaluate(&thresholds, &metrics(dec!(0.12), Decimal::ZERO, 10));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, RiskAlertKind::HighDrawdown);
        assert_eq!(raised[0].level, AlertLevel::Warning);
        assert_eq!(raised[0].threshold, dec!(0.10));

        assert!(alerts.evaluate(&thresholds, &metrics(dec!(0.13), Decimal::ZERO, 10)).is_empty());
        assert!(alerts.is_active(RiskAlertKind::HighDrawdown));

        assert!(alerts.evaluate(&thresholds, &metrics(dec!(0.05), Decimal::ZERO, 10)).is_empty());
        assert!(!alerts.is_active(RiskAlertKind::HighDrawdown));

        let again = alerts.evaluate(&thresholds, &metrics(dec!(0.11), Decimal::ZERO, 10));
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_each_kind_tracked_separately() {
        let mut alerts = RiskAlerts::new();
        let thresholds = AlertThresholds::default();

        let raised = alerts.evaluate(&thresholds, &metrics(Decimal::ZERO, dec!(0.04), 85));
        let kinds: Vec<RiskAlertKind> = raised.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![RiskAlertKind::HighDailyLoss, RiskAlertKind::CriticalRiskScore]
        );
        assert_eq!(raised[1].level, AlertLevel::Critical);

        let raised = alerts.evaluate(&thresholds, &metrics(dec!(0.11), dec!(0.04), 85));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, RiskAlertKind::HighDrawdown);
    }
}
