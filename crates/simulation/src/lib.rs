//! Paper collaborators for the trading engine.
//!
//! This crate provides stand-ins for the engine's external interfaces so it
//! can run locally and be tested end to end:
//! - Price path generators (geometric Brownian motion, scripted paths)
//! - Technical indicators over candle history
//! - A simulated snapshot feed
//! - Random and fixed signal sources
//! - A paper exchange with fees, slippage and fault injection

/// Prelude module for convenient imports.
pub mod prelude;

/// Paper exchange.
pub mod exchange;
/// Simulated market snapshot feed.
pub mod feed;
/// Indicator calculations.
pub mod indicators;
/// Price path generators.
pub mod price_path;
/// Mock signal sources.
pub mod signals;
