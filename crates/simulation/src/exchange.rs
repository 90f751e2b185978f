//! Paper exchange: fills market orders at the simulated feed's price.
//!
//! Accepted orders are acknowledged and filled from a spawned task after a
//! short delay, mirroring the asynchronous callback stream of a real venue.
//! Faults can be queued to exercise the engine's retry and rollback paths.

use crate::feed::SimulatedFeed;
use async_trait::async_trait;
use ftrade_domain::entities::{ExchangeOrderId, OrderId};
use ftrade_domain::enums::{OrderSide, PositionSide};
use ftrade_domain::value_objects::Symbol;
use ftrade_execution::error::ExchangeError;
use ftrade_execution::ports::{
    ExchangeClient, ExchangePosition, ExchangeUpdate, ExchangeUpdateKind, OrderRequest,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

const UPDATE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Taker fee as a fraction of notional.
    pub fee_rate: Decimal,
    /// Price concession on every fill.
    pub slippage: Decimal,
    /// Delay before the ack and fill are sent.
    pub fill_delay: Duration,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(4, 4),  // 0.04%
            slippage: Decimal::new(5, 4),  // 0.05%
            fill_delay: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    hang: u32,
    reject: u32,
    transport: u32,
}

/// Net venue position; quantity is signed, negative for short.
#[derive(Debug, Clone, Copy, Default)]
struct Holding {
    quantity: Decimal,
    entry_price: Decimal,
}

/// In-process venue for paper trading and tests.
pub struct PaperExchange {
    config: PaperConfig,
    feed: Arc<SimulatedFeed>,
    updates: Mutex<mpsc::Sender<ExchangeUpdate>>,
    faults: Mutex<Faults>,
    holdings: Arc<Mutex<HashMap<Symbol, Holding>>>,
    next_id: AtomicU64,
}

impl PaperExchange {
    /// Returns the exchange and the stream its callbacks arrive on.
    pub fn new(config: PaperConfig, feed: Arc<SimulatedFeed>) -> (Arc<Self>, mpsc::Receiver<ExchangeUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CAPACITY);
        let exchange = Self {
            config,
            feed,
            updates: Mutex::new(tx),
            faults: Mutex::new(Faults::default()),
            holdings: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        };
        (Arc::new(exchange), rx)
    }

    /// Opens a fresh callback stream, as after a reconnect. Fills still in
    /// flight go to the old stream.
    pub async fn reconnect(&self) -> mpsc::Receiver<ExchangeUpdate> {
        let (tx, rx) = mpsc::channel(UPDATE_CAPACITY);
        *self.updates.lock().await = tx;
        rx
    }

    /// The next `n` submissions never return.
    pub async fn hang_next(&self, n: u32) {
        self.faults.lock().await.hang = n;
    }

    /// The next `n` submissions are rejected by the venue.
    pub async fn reject_next(&self, n: u32) {
        self.faults.lock().await.reject = n;
    }

    /// The next `n` submissions fail with a transport error.
    pub async fn fail_next(&self, n: u32) {
        self.faults.lock().await.transport = n;
    }

    /// Places a position at the venue without an order, as when resuming
    /// a paper account.
    pub async fn seed_position(&self, position: &ExchangePosition) {
        let quantity = match position.side {
            PositionSide::Long => position.quantity,
            PositionSide::Short => -position.quantity,
        };
        self.holdings.lock().await.insert(
            position.symbol.clone(),
            Holding {
                quantity,
                entry_price: position.entry_price,
            },
        );
    }

    /// Signed venue quantity for `symbol`.
    pub async fn net_quantity(&self, symbol: &Symbol) -> Decimal {
        self.holdings
            .lock()
            .await
            .get(symbol)
            .map_or(Decimal::ZERO, |h| h.quantity)
    }

    async fn take_fault(&self) -> Option<Result<(), ExchangeError>> {
        let mut faults = self.faults.lock().await;
        if faults.hang > 0 {
            faults.hang -= 1;
            return Some(Ok(()));
        }
        if faults.reject > 0 {
            faults.reject -= 1;
            return Some(Err(ExchangeError::Rejected("insufficient margin".to_string())));
        }
        if faults.transport > 0 {
            faults.transport -= 1;
            return Some(Err(ExchangeError::Transport("connection reset".to_string())));
        }
        None
    }

    fn fill_price(&self, side: OrderSide, price: Decimal) -> Decimal {
        let concession = price * self.config.slippage;
        match side {
            OrderSide::Buy => price + concession,
            OrderSide::Sell => price - concession,
        }
    }
}

fn apply_fill(holding: &mut Holding, side: OrderSide, quantity: Decimal, price: Decimal) {
    let signed = match side {
        OrderSide::Buy => quantity,
        OrderSide::Sell => -quantity,
    };
    let next = holding.quantity + signed;
    let adds = holding.quantity.is_zero() || holding.quantity.is_sign_positive() == signed.is_sign_positive();
    if adds {
        let notional = holding.entry_price * holding.quantity.abs() + price * quantity;
        holding.entry_price = notional / next.abs();
    } else if !next.is_zero() && next.is_sign_positive() != holding.quantity.is_sign_positive() {
        // flipped through zero
        holding.entry_price = price;
    }
    holding.quantity = next;
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn submit_order(&self, request: OrderRequest) -> Result<ExchangeOrderId, ExchangeError> {
        match self.take_fault().await {
            Some(Ok(())) => {
                warn!(order_id = %request.client_order_id, "Paper venue hanging on submit");
                return std::future::pending().await;
            }
            Some(Err(e)) => return Err(e),
            None => {}
        }

        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!(
                "invalid quantity {}",
                request.quantity
            )));
        }
        let price = self
            .feed
            .last_price(&request.symbol)
            .await
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ExchangeError::Rejected(format!("no market for {}", request.symbol)))?;
        if request.reduce_only && self.net_quantity(&request.symbol).await.is_zero() {
            return Err(ExchangeError::Rejected(
                "reduce-only order with no position".to_string(),
            ));
        }

        let exchange_order_id = ExchangeOrderId(format!(
            "PAPER-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        let fill_price = self.fill_price(request.side, price);
        let fee = (request.quantity * fill_price * self.config.fee_rate).round_dp(8);
        let updates = self.updates.lock().await.clone();
        let holdings = self.holdings.clone();
        let delay = self.config.fill_delay;
        let ack_id = exchange_order_id.clone();

        debug!(
            order_id = %request.client_order_id,
            exchange_order_id = %exchange_order_id,
            side = ?request.side,
            quantity = %request.quantity,
            "Paper order accepted"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let OrderRequest {
                client_order_id,
                symbol,
                side,
                quantity,
                ..
            } = request;
            let ack = ExchangeUpdate::new(
                client_order_id,
                symbol.clone(),
                ExchangeUpdateKind::Acknowledged {
                    exchange_order_id: ack_id,
                },
            );
            if updates.send(ack).await.is_err() {
                return;
            }
            {
                let mut holdings = holdings.lock().await;
                let holding = holdings.entry(symbol.clone()).or_default();
                apply_fill(holding, side, quantity, fill_price);
            }
            let fill = ExchangeUpdate::new(
                client_order_id,
                symbol,
                ExchangeUpdateKind::Fill {
                    quantity,
                    price: fill_price,
                    fee,
                },
            );
            let _ = updates.send(fill).await;
        });
        Ok(exchange_order_id)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: OrderId) -> Result<(), ExchangeError> {
        info!(symbol = %symbol, order_id = %order_id, "Paper cancel");
        let update = ExchangeUpdate::new(
            order_id,
            symbol.clone(),
            ExchangeUpdateKind::Cancelled {
                reason: "cancelled by client".to_string(),
            },
        );
        let updates = self.updates.lock().await.clone();
        updates
            .send(update)
            .await
            .map_err(|_| ExchangeError::Transport("update stream closed".to_string()))
    }

    async fn open_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let holdings = self.holdings.lock().await;
        Ok(holdings
            .iter()
            .filter(|(_, h)| !h.quantity.is_zero())
            .map(|(symbol, h)| ExchangePosition {
                symbol: symbol.clone(),
                side: if h.quantity.is_sign_positive() {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                },
                quantity: h.quantity.abs(),
                entry_price: h.entry_price,
            })
            .collect())
    }
}
