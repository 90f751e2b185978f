//! Risk-gated decision and position lifecycle engine.
//!
//! This crate provides the live side of the trading engine:
//! - Strategy evaluation (momentum, grid and externally sourced signals)
//! - Risk gate with exposure caps, daily-loss and drawdown halts
//! - Per-symbol position lifecycle driven by exchange callbacks
//! - Portfolio ledger with reservations and realized/unrealized PnL
//! - Event bus for lifecycle, market, risk and incident topics
//! - Startup reconciliation against the venue

/// Prelude module for convenient imports.
pub mod prelude;

/// Topic-based event bus.
pub mod bus;
/// Engine configuration.
pub mod config;
/// Engine assembly and per-symbol workers.
pub mod engine;
/// Error types.
pub mod error;
/// Closed trade journal.
pub mod journal;
/// Balances, exposure and PnL.
pub mod ledger;
/// Position lifecycle state machine.
pub mod lifecycle;
/// Collaborator traits for market data, signals and the exchange.
pub mod ports;
/// Retry with exponential backoff.
pub mod retry;
/// Risk gate and trading halts.
pub mod risk;
/// Strategies and the strategy registry.
pub mod strategy;

#[cfg(test)]
mod testing;
