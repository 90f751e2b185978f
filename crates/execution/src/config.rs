//! Engine configuration.
//!
//! Loaded from a JSON document; `FTRADE_*` environment variables override
//! individual fields after loading.

use crate::error::EngineError;
use crate::lifecycle::LifecycleSettings;
use crate::retry::RetryConfig;
use crate::risk::RiskConfig;
use crate::strategy::{StrategyConfig, StrategyKind};
use anyhow::Context;
use ftrade_domain::enums::Timeframe;
use ftrade_domain::value_objects::{Percentage, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// A tracked symbol and the strategy that trades it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: Symbol,
    pub strategy: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
}

fn default_timeframe() -> Timeframe {
    Timeframe::M15
}

/// Deadlines for each external call, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub snapshot_ms: u64,
    pub signal_ms: u64,
    pub exchange_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            snapshot_ms: 2_000,
            signal_ms: 5_000,
            exchange_ms: 3_000,
        }
    }
}

impl TimeoutConfig {
    pub fn snapshot(&self) -> Duration {
        Duration::from_millis(self.snapshot_ms)
    }

    pub fn signal(&self) -> Duration {
        Duration::from_millis(self.signal_ms)
    }

    pub fn exchange(&self) -> Duration {
        Duration::from_millis(self.exchange_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_secs: u64,
    pub initial_balance: Decimal,
    pub symbols: Vec<SymbolConfig>,
    pub strategies: Vec<StrategyConfig>,
    pub risk: RiskConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    /// Working orders older than this are cancelled.
    pub order_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let btc = Symbol::new("BTCUSDT").map(|symbol| SymbolConfig {
            symbol,
            strategy: "momentum".to_string(),
            timeframe: Timeframe::M15,
        });
        Self {
            tick_interval_secs: 5,
            initial_balance: Decimal::from(10_000),
            symbols: btc.into_iter().collect(),
            strategies: vec![StrategyConfig::new(
                "momentum",
                StrategyKind::Momentum(Default::default()),
            )],
            risk: RiskConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            order_ttl_secs: 120,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("failed to parse engine config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Applies `FTRADE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        fn parse<T: FromStr>(key: &str, raw: &str) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key}={raw}: {e}"))
        }

        if let Some(raw) = lookup("FTRADE_TICK_INTERVAL_SECS") {
            self.tick_interval_secs = parse("FTRADE_TICK_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("FTRADE_INITIAL_BALANCE") {
            self.initial_balance = parse("FTRADE_INITIAL_BALANCE", &raw)?;
        }
        if let Some(raw) = lookup("FTRADE_ORDER_TTL_SECS") {
            self.order_ttl_secs = parse("FTRADE_ORDER_TTL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("FTRADE_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse("FTRADE_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("FTRADE_PER_TRADE_CAP") {
            self.risk.per_trade_cap = Percentage::new(parse("FTRADE_PER_TRADE_CAP", &raw)?);
        }
        if let Some(raw) = lookup("FTRADE_DAILY_LOSS_LIMIT") {
            self.risk.daily_loss_limit = Percentage::new(parse("FTRADE_DAILY_LOSS_LIMIT", &raw)?);
        }
        if let Some(raw) = lookup("FTRADE_SYMBOLS") {
            // Comma separated SYMBOL[:strategy[:timeframe]] entries.
            let mut symbols = Vec::new();
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let mut parts = item.split(':');
                let symbol = Symbol::new(parts.next().unwrap_or_default())
                    .map_err(|e| anyhow::anyhow!("FTRADE_SYMBOLS: {e}"))?;
                let strategy = parts.next().unwrap_or("momentum").to_string();
                let timeframe = match parts.next() {
                    Some(tf) => serde_json::from_value(serde_json::Value::String(tf.to_string()))
                        .with_context(|| format!("FTRADE_SYMBOLS: bad timeframe {tf}"))?,
                    None => default_timeframe(),
                };
                symbols.push(SymbolConfig {
                    symbol,
                    strategy,
                    timeframe,
                });
            }
            self.symbols = symbols;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        if self.symbols.is_empty() {
            return fail("no symbols configured".into());
        }
        if self.tick_interval_secs == 0 {
            return fail("tick_interval_secs must be positive".into());
        }
        if self.initial_balance <= Decimal::ZERO {
            return fail(format!("initial_balance {} must be positive", self.initial_balance));
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1".into());
        }
        if self.timeouts.snapshot_ms == 0 || self.timeouts.signal_ms == 0 || self.timeouts.exchange_ms == 0 {
            return fail("timeouts must be positive".into());
        }
        if self.order_ttl_secs == 0 {
            return fail("order_ttl_secs must be positive".into());
        }
        self.risk.validate().map_err(EngineError::Config)?;

        let mut names = HashSet::new();
        for strategy in &self.strategies {
            if !names.insert(strategy.name.as_str()) {
                return fail(format!("duplicate strategy {}", strategy.name));
            }
            if strategy.size_multiplier <= Decimal::ZERO {
                return fail(format!("strategy {}: size_multiplier must be positive", strategy.name));
            }
        }

        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(&symbol.symbol) {
                return fail(format!("symbol {} listed twice", symbol.symbol));
            }
            if !names.contains(symbol.strategy.as_str()) {
                return Err(EngineError::UnknownStrategy(symbol.strategy.clone()));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            exit_levels: self.risk.exit_levels(),
            retry: self.retry.clone(),
            exchange_timeout: self.timeouts.exchange(),
            order_ttl: Duration::from_secs(self.order_ttl_secs),
        }
    }
}
