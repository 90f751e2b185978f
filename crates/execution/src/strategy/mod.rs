//! Strategies turning market snapshots into directional signals.
//!
//! The set is closed: [`Strategy`] is a tagged variant selected by
//! configuration, and [`StrategyRegistry`] tracks which named strategies may
//! propose new entries.

mod ai;
mod grid;
mod momentum;
mod registry;

pub use ai::*;
pub use grid::*;
pub use momentum::*;
pub use registry::*;

use crate::error::SignalError;
use ftrade_domain::entities::{Signal, Snapshot};
use serde::{Deserialize, Serialize};

/// Strategy kind and its parameters, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    Momentum(MomentumConfig),
    /// Uses the engine's configured signal source.
    AiDriven,
    Grid(GridConfig),
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Momentum(_) => "momentum",
            StrategyKind::AiDriven => "ai_driven",
            StrategyKind::Grid(_) => "grid",
        }
    }
}

/// A named strategy definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Scales the per-trade proposal size before the risk gate caps it.
    #[serde(default = "unit_multiplier")]
    pub size_multiplier: rust_decimal::Decimal,
    #[serde(flatten)]
    pub kind: StrategyKind,
}

fn enabled_by_default() -> bool {
    true
}

fn unit_multiplier() -> rust_decimal::Decimal {
    rust_decimal::Decimal::ONE
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>, kind: StrategyKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            size_multiplier: rust_decimal::Decimal::ONE,
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Momentum(MomentumStrategy),
    AiDriven(AiDrivenStrategy),
    Grid(GridStrategy),
}

impl Strategy {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Strategy::Momentum(_) => "momentum",
            Strategy::AiDriven(_) => "ai_driven",
            Strategy::Grid(_) => "grid",
        }
    }

    /// Signal for the snapshot, tagged with `name` as its source.
    pub async fn propose(&self, name: &str, snapshot: &Snapshot) -> Result<Signal, SignalError> {
        match self {
            Strategy::Momentum(s) => Ok(s.propose(snapshot, name)),
            Strategy::AiDriven(s) => s.propose(snapshot).await,
            Strategy::Grid(s) => Ok(s.propose(snapshot, name)),
        }
    }

    /// Whether low-confidence or reversed signals close open positions.
    pub fn exits_on_signal(&self) -> bool {
        !matches!(self, Strategy::Grid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_strategy_config_from_json() {
        let raw = r#"[
            {"name": "fast", "type": "momentum", "entry_threshold": "40"},
            {"name": "model", "type": "ai_driven", "enabled": false},
            {"name": "range", "type": "grid", "levels": 6, "size_multiplier": "0.5"}
        ]"#;
        let configs: Vec<StrategyConfig> = serde_json::from_str(raw).unwrap();

        match &configs[0].kind {
            StrategyKind::Momentum(m) => {
                assert_eq!(m.entry_threshold, dec!(40));
                assert_eq!(m.min_candles, 10);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(configs[0].enabled);
        assert_eq!(configs[1].kind, StrategyKind::AiDriven);
        assert!(!configs[1].enabled);
        assert_eq!(configs[2].size_multiplier, dec!(0.5));
        assert_eq!(configs[2].kind.label(), "grid");
    }

    #[test]
    fn test_grid_never_exits_on_signal() {
        assert!(!Strategy::Grid(GridStrategy::default()).exits_on_signal());
        assert!(Strategy::Momentum(MomentumStrategy::default()).exits_on_signal());
    }
}
