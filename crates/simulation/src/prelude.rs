//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use ftrade_simulation::prelude::*;
//! ```

// Exchange
pub use crate::exchange::{PaperConfig, PaperExchange};

// Feed
pub use crate::feed::SimulatedFeed;

// Indicators
pub use crate::indicators::{bollinger, compute_indicators, ema, rsi, sma};

// Price path generators
pub use crate::price_path::{DeterministicPricePath, GeometricBrownianMotion, PricePathGenerator};

// Signals
pub use crate::signals::{FixedSignalSource, RandomSignalSource};
