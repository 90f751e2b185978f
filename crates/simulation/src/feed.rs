//! Simulated market data.
//!
//! Each fetch advances the symbol's price path by one candle, so the feed
//! moves at the engine's tick rate.

use crate::indicators::compute_indicators;
use crate::price_path::{GeometricBrownianMotion, PricePathGenerator};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ftrade_domain::entities::{Candle, Snapshot};
use ftrade_domain::enums::Timeframe;
use ftrade_domain::value_objects::Symbol;
use ftrade_execution::error::MarketDataError;
use ftrade_execution::ports::SnapshotProvider;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_HISTORY: usize = 60;

struct Series {
    path: Box<dyn PricePathGenerator>,
    candles: VecDeque<Candle>,
}

/// Snapshot provider backed by per-symbol price paths.
pub struct SimulatedFeed {
    series: Mutex<HashMap<Symbol, Series>>,
    history: usize,
    base_volume: Decimal,
    failing: AtomicBool,
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl SimulatedFeed {
    /// Feed keeping `history` candles per symbol.
    pub fn new(history: usize) -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            history: history.max(1),
            base_volume: Decimal::from(100),
            failing: AtomicBool::new(false),
        }
    }

    /// Registers `symbol` with its own price path. History is back-filled
    /// flat at the path's first price.
    pub async fn add_symbol(&self, symbol: Symbol, mut path: impl PricePathGenerator + 'static) {
        let first = path.next_price();
        let now = Utc::now();
        let candles = (0..self.history)
            .rev()
            .map(|age| Candle {
                timestamp: now - ChronoDuration::minutes(age as i64 + 1),
                open: first,
                high: first,
                low: first,
                close: first,
                volume: self.base_volume,
            })
            .collect();
        self.series.lock().await.insert(
            symbol,
            Series {
                path: Box::new(path),
                candles,
            },
        );
    }

    /// Registers `symbol` on a GBM path with daily steps.
    pub async fn add_gbm(&self, symbol: Symbol, initial_price: Decimal, volatility: f64, seed: u64) {
        let path = GeometricBrownianMotion::seeded(initial_price, 0.0, volatility, 1.0 / 365.0, seed);
        self.add_symbol(symbol, path).await;
    }

    /// Close of the newest candle.
    pub async fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.series
            .lock()
            .await
            .get(symbol)
            .and_then(|s| s.candles.back())
            .map(|c| c.close)
    }

    pub fn symbols_tracked(&self) -> usize {
        self.series.try_lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Makes every fetch fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn next_candle(&self, previous: &Candle, close: Decimal) -> Candle {
        let open = previous.close;
        // bigger moves trade more volume
        let change = if open.is_zero() {
            Decimal::ZERO
        } else {
            ((close - open) / open).abs()
        };
        Candle {
            timestamp: Utc::now(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: (self.base_volume * (Decimal::ONE + change * Decimal::from(50))).round_dp(4),
        }
    }
}

#[async_trait]
impl SnapshotProvider for SimulatedFeed {
    async fn fetch_snapshot(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Snapshot, MarketDataError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MarketDataError::Unavailable("simulated outage".to_string()));
        }

        let mut series = self.series.lock().await;
        let series = series
            .get_mut(symbol)
            .ok_or_else(|| MarketDataError::Unavailable(format!("no simulated market for {symbol}")))?;
        let previous = series
            .candles
            .back()
            .cloned()
            .ok_or_else(|| MarketDataError::Empty(symbol.clone()))?;

        let close = series.path.next_price();
        let candle = self.next_candle(&previous, close);
        series.candles.push_back(candle);
        while series.candles.len() > self.history {
            series.candles.pop_front();
        }

        let candles: Vec<Candle> = series.candles.iter().cloned().collect();
        let indicators = compute_indicators(&candles);
        debug!(symbol = %symbol, close = %close, indicators = indicators.len(), "Simulated candle");
        Ok(Snapshot::new(symbol.clone(), timeframe, candles, indicators))
    }
}
