//! PostgreSQL-backed [`StateStore`].

use crate::repositories::Database;
use crate::store::{PersistedState, StateStore, StoreError};
use async_trait::async_trait;
use ftrade_domain::entities::{HaltState, LedgerEntry, Order, OrderId, Position};
use ftrade_domain::value_objects::Symbol;
use tracing::debug;

#[derive(Clone)]
pub struct PgStateStore {
    db: Database,
}

impl PgStateStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connects and applies the schema.
    ///
    /// # Errors
    /// Returns an error if the connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db = Database::connect(database_url).await?;
        db.migrate().await?;
        Ok(Self::new(db))
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        let positions = self
            .db
            .positions()
            .find_all()
            .await?
            .into_iter()
            .map(|r| (r.position.symbol.clone(), r.position))
            .collect();
        let orders = self.db.orders().find_all().await?;
        let ledger = self.db.ledger().find_all().await?;
        let halts = self.db.halts().load().await?;

        let state = PersistedState {
            positions,
            orders,
            ledger,
            halts,
        };
        debug!(
            positions = state.positions.len(),
            orders = state.orders.len(),
            ledger_entries = state.ledger.len(),
            "Loaded state from database"
        );
        Ok(state)
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
        Ok(self.db.positions().upsert(position).await?)
    }

    async fn remove_position(&self, symbol: &Symbol) -> Result<(), StoreError> {
        self.db.positions().delete(symbol).await?;
        Ok(())
    }

    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError> {
        Ok(self.db.orders().upsert(order).await?)
    }

    async fn remove_order(&self, id: OrderId) -> Result<(), StoreError> {
        self.db.orders().delete(id).await?;
        Ok(())
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        Ok(self.db.ledger().append(entry).await?)
    }

    async fn save_halts(&self, halts: &HaltState) -> Result<(), StoreError> {
        Ok(self.db.halts().save(halts).await?)
    }
}
