//! Interfaces to the collaborators the engine drives: market data, signal
//! generation and the exchange.

use crate::error::{ExchangeError, MarketDataError, SignalError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ftrade_domain::entities::{ExchangeOrderId, OrderId, Signal, Snapshot};
use ftrade_domain::enums::{OrderSide, OrderType, PositionSide, Timeframe};
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Supplies OHLCV plus indicators per symbol.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshot(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Snapshot, MarketDataError>;
}

/// External signal generator (model, analyst feed, ...).
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Short name used as the signal's source tag.
    fn name(&self) -> &str;

    async fn generate_signal(&self, snapshot: &Snapshot) -> Result<Signal, SignalError>;
}

/// Order submission request. `client_order_id` is echoed back on every
/// [`ExchangeUpdate`] for the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub reduce_only: bool,
}

/// A position as reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Order execution service.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submits an order. `Ok` means the venue accepted the request; fills
    /// arrive later on the update stream.
    async fn submit_order(&self, request: OrderRequest) -> Result<ExchangeOrderId, ExchangeError>;

    async fn cancel_order(&self, symbol: &Symbol, order_id: OrderId) -> Result<(), ExchangeError>;

    /// Positions currently held at the venue.
    async fn open_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeUpdateKind {
    Acknowledged {
        exchange_order_id: ExchangeOrderId,
    },
    Rejected {
        reason: String,
    },
    Fill {
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    },
    Cancelled {
        reason: String,
    },
}

/// Asynchronous ack/fill/reject callback for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeUpdate {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub kind: ExchangeUpdateKind,
    pub timestamp: DateTime<Utc>,
}

impl ExchangeUpdate {
    pub fn new(order_id: OrderId, symbol: Symbol, kind: ExchangeUpdateKind) -> Self {
        Self {
            order_id,
            symbol,
            kind,
            timestamp: Utc::now(),
        }
    }
}
