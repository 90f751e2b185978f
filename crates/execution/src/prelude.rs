//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use ftrade_execution::prelude::*;
//! ```

// Bus
pub use crate::bus::{
    BusStats, EngineEvent, Envelope, EventBus, EventHandler, FnHandler, Incident, IncidentKind,
    Subscription, Topic, handler_fn,
};

// Config
pub use crate::config::{EngineConfig, SymbolConfig, TimeoutConfig};

// Engine
pub use crate::engine::{EngineBuilder, EngineHandle, Mismatch, RecoveryReport, ShutdownReport};

// Errors
pub use crate::error::{
    EngineError, ErrorKind, ExchangeError, LifecycleError, MarketDataError, SignalError,
};

// Journal
pub use crate::journal::{AggregateStats, TradeJournal, TradeSummary};

// Ledger
pub use crate::ledger::{AccountBook, LedgerSnapshot, PortfolioLedger, SymbolExposure};

// Ports
pub use crate::ports::{
    ExchangeClient, ExchangePosition, ExchangeUpdate, ExchangeUpdateKind, OrderRequest,
    SignalSource, SnapshotProvider,
};

// Retry
pub use crate::retry::{ExponentialBackoff, RetryConfig};

// Risk
pub use crate::risk::{
    AlertLevel, AlertThresholds, Proposal, ReasonCode, RiskAlert, RiskAlertKind, RiskConfig,
    RiskDecision, RiskGate, RiskMetrics, TradingHalt, Verdict,
};

// Strategy
pub use crate::strategy::{
    GridConfig, MomentumConfig, StrategyConfig, StrategyKind, StrategyRegistry, StrategyStatus,
};
