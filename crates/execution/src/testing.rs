//! Shared fixtures for unit tests.

use crate::bus::EventBus;
use crate::error::ExchangeError;
use crate::ledger::{AccountBook, PortfolioLedger, SharedBook};
use crate::lifecycle::{BookViews, LifecycleContext, LifecycleSettings, OpenRequest};
use crate::error::{MarketDataError, SignalError};
use crate::ports::{
    ExchangeClient, ExchangePosition, OrderRequest, SignalSource, SnapshotProvider,
};
use crate::retry::RetryConfig;
use crate::risk::{RiskConfig, TradingHalt};
use async_trait::async_trait;
use chrono::Utc;
use ftrade_data::MemoryStateStore;
use ftrade_domain::entities::{Candle, ExchangeOrderId, OrderId, Signal, Snapshot};
use ftrade_domain::enums::{Direction, PositionSide, Timeframe};
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Exchange that answers from a queue of canned results, accepting once the
/// queue is empty.
#[derive(Default)]
pub struct ScriptedExchange {
    responses: Mutex<VecDeque<Result<ExchangeOrderId, ExchangeError>>>,
    requests: Mutex<Vec<OrderRequest>>,
    cancels: Mutex<Vec<OrderId>>,
    positions: Mutex<Vec<ExchangePosition>>,
    positions_fail: AtomicBool,
    hang: AtomicBool,
    next_id: AtomicU64,
}

impl ScriptedExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: Result<ExchangeOrderId, ExchangeError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Every later submission never returns.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn set_positions(&self, positions: Vec<ExchangePosition>) {
        *self.positions.lock().unwrap() = positions;
    }

    pub fn fail_positions(&self) {
        self.positions_fail.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<OrderId> {
        self.cancels.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn submit_order(&self, request: OrderRequest) -> Result<ExchangeOrderId, ExchangeError> {
        self.requests.lock().unwrap().push(request);
        if self.hang.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(ExchangeOrderId(format!("EX-{n}")))
        })
    }

    async fn cancel_order(&self, _symbol: &Symbol, order_id: OrderId) -> Result<(), ExchangeError> {
        self.cancels.lock().unwrap().push(order_id);
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        if self.positions_fail.load(Ordering::SeqCst) {
            return Err(ExchangeError::Transport("positions endpoint down".into()));
        }
        Ok(self.positions.lock().unwrap().clone())
    }
}

pub fn btc() -> Symbol {
    Symbol::new("BTCUSDT").unwrap()
}

pub fn settings() -> LifecycleSettings {
    LifecycleSettings {
        exit_levels: RiskConfig::default().exit_levels(),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
        exchange_timeout: Duration::from_millis(50),
        order_ttl: Duration::from_secs(60),
    }
}

pub fn open_request(side: PositionSide, quantity: Decimal, price: Decimal) -> OpenRequest {
    OpenRequest {
        side,
        strategy: "momentum".to_string(),
        quantity,
        reference_price: price,
        confidence: Decimal::new(85, 2),
    }
}

pub struct Fixture {
    pub exchange: Arc<ScriptedExchange>,
    pub store: Arc<MemoryStateStore>,
    pub bus: EventBus,
    pub book: SharedBook,
    pub views: BookViews,
    pub ctx: Arc<LifecycleContext>,
}

pub fn fixture() -> Fixture {
    let exchange = ScriptedExchange::new();
    let store = Arc::new(MemoryStateStore::new());
    let bus = EventBus::new();
    let book = AccountBook::new(
        PortfolioLedger::new(Decimal::from(10_000), Utc::now()),
        TradingHalt::new(),
    )
    .shared();
    let views = BookViews::new();
    let ctx = Arc::new(LifecycleContext {
        exchange: exchange.clone(),
        store: store.clone(),
        bus: bus.clone(),
        book: book.clone(),
        views: views.clone(),
        settings: settings(),
    });
    Fixture {
        exchange,
        store,
        bus,
        book,
        views,
        ctx,
    }
}

/// Feed returning flat candles at a settable price per symbol.
#[derive(Default)]
pub struct StaticFeed {
    prices: Mutex<HashMap<Symbol, Decimal>>,
    fail: AtomicBool,
}

impl StaticFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.clone(), price);
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotProvider for StaticFeed {
    async fn fetch_snapshot(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Snapshot, MarketDataError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MarketDataError::Unavailable("feed down".into()));
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketDataError::Empty(symbol.clone()))?;
        let now = Utc::now();
        let candles = (0..20)
            .map(|_| Candle {
                timestamp: now,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: Decimal::ONE,
            })
            .collect();
        Ok(Snapshot::new(symbol.clone(), timeframe, candles, BTreeMap::new()))
    }
}

/// Signal source answering with a settable direction and confidence.
pub struct ScriptedSignals {
    next: Mutex<(Direction, Decimal)>,
    fail: AtomicBool,
}

impl ScriptedSignals {
    pub fn new(direction: Direction, confidence: Decimal) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new((direction, confidence)),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set(&self, direction: Direction, confidence: Decimal) {
        *self.next.lock().unwrap() = (direction, confidence);
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalSource for ScriptedSignals {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_signal(&self, snapshot: &Snapshot) -> Result<Signal, SignalError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SignalError::Unavailable("model offline".into()));
        }
        let (direction, confidence) = *self.next.lock().unwrap();
        Ok(Signal::new(snapshot.symbol.clone(), direction, confidence, "scripted")?)
    }
}
