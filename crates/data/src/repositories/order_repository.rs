//! Order repository for live order persistence.

use ftrade_domain::entities::{Order, OrderId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Repository for live (non-terminal) orders.
#[derive(Clone)]
pub struct OrderRepository {
    pool: Arc<PgPool>,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
        let Json(order): Json<Order> = row.try_get("payload")?;
        Ok(order)
    }

    /// Finds all stored orders, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<Order>, sqlx::Error> {
        let rows = sqlx::query("SELECT payload FROM orders ORDER BY updated_at")
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    /// Stores a live order, or deletes it once it is terminal.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn upsert(&self, order: &Order) -> Result<(), sqlx::Error> {
        if order.is_terminal() {
            self.delete(order.id).await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, symbol, status, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(order.id.0)
        .bind(order.symbol.as_str())
        .bind(order.status.to_string())
        .bind(Json(order))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Deletes an order by ID.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn delete(&self, id: OrderId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.0)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
