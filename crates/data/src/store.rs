//! Durable engine state and the storage seam.

use async_trait::async_trait;
use ftrade_domain::entities::{HaltState, LedgerEntry, Order, OrderId, Position};
use ftrade_domain::value_objects::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors raised by a [`StateStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// Document could not be encoded or decoded.
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Database failure.
    #[error("store database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Everything that must survive a restart: open positions, live orders,
/// the ledger and the halt flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Tracked positions keyed by symbol.
    pub positions: BTreeMap<Symbol, Position>,
    /// Non-terminal orders.
    pub orders: Vec<Order>,
    /// Ledger entries, oldest first.
    pub ledger: Vec<LedgerEntry>,
    /// Halt flags.
    pub halts: HaltState,
}

impl PersistedState {
    /// Balance after the last ledger entry.
    pub fn balance(&self) -> Option<rust_decimal::Decimal> {
        self.ledger.last().map(|e| e.balance_after)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
            && self.orders.is_empty()
            && self.ledger.is_empty()
            && self.halts.is_clear()
    }

    /// Applies an order upsert in place, dropping terminal orders.
    pub(crate) fn put_order(&mut self, order: &Order) {
        self.orders.retain(|o| o.id != order.id);
        if !order.is_terminal() {
            self.orders.push(order.clone());
        }
    }

    pub(crate) fn drop_order(&mut self, id: OrderId) {
        self.orders.retain(|o| o.id != id);
    }
}

/// Persistence seam used by the engine. Every mutation of tracked state is
/// written through one of these calls before the engine moves on.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the last saved state, or an empty state on first run.
    async fn load(&self) -> Result<PersistedState, StoreError>;

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError>;

    async fn remove_position(&self, symbol: &Symbol) -> Result<(), StoreError>;

    /// Stores a live order. Terminal orders are removed instead.
    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn remove_order(&self, id: OrderId) -> Result<(), StoreError>;

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn save_halts(&self, halts: &HaltState) -> Result<(), StoreError>;
}
