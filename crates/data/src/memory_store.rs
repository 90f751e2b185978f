//! In-process store, used by tests and dry runs.

use crate::store::{PersistedState, StateStore, StoreError};
use async_trait::async_trait;
use ftrade_domain::entities::{HaltState, LedgerEntry, Order, OrderId, Position};
use ftrade_domain::value_objects::Symbol;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<PersistedState>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from previously saved state, as after a restart.
    #[must_use]
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn snapshot(&self) -> PersistedState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .positions
            .insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    async fn remove_position(&self, symbol: &Symbol) -> Result<(), StoreError> {
        self.state.lock().await.positions.remove(symbol);
        Ok(())
    }

    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError> {
        self.state.lock().await.put_order(order);
        Ok(())
    }

    async fn remove_order(&self, id: OrderId) -> Result<(), StoreError> {
        self.state.lock().await.drop_order(id);
        Ok(())
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.state.lock().await.ledger.push(entry.clone());
        Ok(())
    }

    async fn save_halts(&self, halts: &HaltState) -> Result<(), StoreError> {
        self.state.lock().await.halts = halts.clone();
        Ok(())
    }
}
