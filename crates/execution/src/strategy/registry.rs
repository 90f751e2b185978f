use super::{
    AiDrivenStrategy, GridStrategy, MomentumStrategy, Strategy, StrategyConfig, StrategyKind,
};
use crate::error::EngineError;
use crate::ports::SignalSource;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// A configured strategy and its runtime switch.
#[derive(Debug)]
pub struct StrategyEntry {
    name: String,
    strategy: Strategy,
    size_multiplier: Decimal,
    enabled: AtomicBool,
}

impl StrategyEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn size_multiplier(&self) -> Decimal {
        self.size_multiplier
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Reported by [`StrategyRegistry::list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub size_multiplier: Decimal,
}

/// Named strategies shared by every symbol worker.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<String, Arc<StrategyEntry>>,
}

impl StrategyRegistry {
    /// Builds every configured strategy. AI-driven strategies need `source`.
    pub fn from_config(
        configs: &[StrategyConfig],
        source: Option<Arc<dyn SignalSource>>,
    ) -> Result<Self, EngineError> {
        let mut entries = BTreeMap::new();
        for config in configs {
            let strategy = match &config.kind {
                StrategyKind::Momentum(params) => {
                    Strategy::Momentum(MomentumStrategy::new(params.clone()))
                }
                StrategyKind::Grid(params) => Strategy::Grid(GridStrategy::new(params.clone())),
                StrategyKind::AiDriven => {
                    let source = source
                        .clone()
                        .ok_or(EngineError::MissingCollaborator("signal source"))?;
                    Strategy::AiDriven(AiDrivenStrategy::new(source))
                }
            };
            let entry = StrategyEntry {
                name: config.name.clone(),
                strategy,
                size_multiplier: config.size_multiplier,
                enabled: AtomicBool::new(config.enabled),
            };
            if entries.insert(config.name.clone(), Arc::new(entry)).is_some() {
                return Err(EngineError::Config(format!(
                    "duplicate strategy name {}",
                    config.name
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<Arc<StrategyEntry>> {
        self.entries.get(name).cloned()
    }

    /// Enables or disables proposals from a strategy. Open positions keep
    /// being evaluated for exits either way.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EngineError::UnknownStrategy(name.to_string()))?;
        let was = entry.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(strategy = %name, enabled, "Strategy toggled");
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<StrategyStatus> {
        self.entries
            .values()
            .map(|e| StrategyStatus {
                name: e.name.clone(),
                kind: e.strategy.kind_label().to_string(),
                enabled: e.is_enabled(),
                size_multiplier: e.size_multiplier,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::GridConfig;
    use rust_decimal_macros::dec;

    fn configs() -> Vec<StrategyConfig> {
        let mut grid = StrategyConfig::new("range", StrategyKind::Grid(GridConfig::default()));
        grid.size_multiplier = dec!(0.5);
        vec![
            StrategyConfig::new("momentum", StrategyKind::Momentum(Default::default())),
            grid,
        ]
    }

    #[test]
    fn test_registry_toggles_by_name() {
        let registry = StrategyRegistry::from_config(&configs(), None).unwrap();
        let entry = registry.get("momentum").unwrap();
        assert!(entry.is_enabled());

        registry.set_enabled("momentum", false).unwrap();
        assert!(!entry.is_enabled());
        assert!(matches!(
            registry.set_enabled("nope", true),
            Err(EngineError::UnknownStrategy(_))
        ));

        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].kind, "grid");
        assert_eq!(list[1].size_multiplier, dec!(0.5));
    }

    #[test]
    fn test_ai_driven_needs_a_source() {
        let configs = vec![StrategyConfig::new("model", StrategyKind::AiDriven)];
        assert!(matches!(
            StrategyRegistry::from_config(&configs, None),
            Err(EngineError::MissingCollaborator(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut configs = configs();
        configs.push(StrategyConfig::new("range", StrategyKind::Grid(GridConfig::default())));
        assert!(matches!(
            StrategyRegistry::from_config(&configs, None),
            Err(EngineError::Config(_))
        ));
    }
}
