//! Position repository for tracked position persistence.

use ftrade_domain::entities::Position;
use ftrade_domain::value_objects::Symbol;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

/// Database record for a tracked position.
#[derive(Debug, Clone)]
pub struct PositionRecord {
    /// Symbol the position is held on.
    pub symbol: String,
    /// Position identifier.
    pub id: Uuid,
    /// Lifecycle state label.
    pub state: String,
    /// Full position document.
    pub position: Position,
    /// Record update timestamp.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PositionRecord {
    /// Creates a PositionRecord from a database row.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let Json(position): Json<Position> = row.try_get("payload")?;
        Ok(Self {
            symbol: row.try_get("symbol")?,
            id: row.try_get("id")?,
            state: row.try_get("state")?,
            position,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Repository for position CRUD operations.
#[derive(Clone)]
pub struct PositionRepository {
    pool: Arc<PgPool>,
}

impl PositionRepository {
    /// Creates a new PositionRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds all tracked positions.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<PositionRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM positions ORDER BY symbol")
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(PositionRecord::from_row).collect()
    }

    /// Finds the position tracked for a symbol.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_symbol(
        &self,
        symbol: &Symbol,
    ) -> Result<Option<PositionRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM positions WHERE symbol = $1")
            .bind(symbol.as_str())
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(PositionRecord::from_row).transpose()
    }

    /// Creates or replaces the position tracked for its symbol.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn upsert(&self, position: &Position) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO positions (symbol, id, state, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (symbol) DO UPDATE SET
                id = EXCLUDED.id,
                state = EXCLUDED.state,
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(position.symbol.as_str())
        .bind(position.id.0)
        .bind(format!("{:?}", position.state).to_uppercase())
        .bind(Json(position))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Deletes the position tracked for a symbol.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn delete(&self, symbol: &Symbol) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM positions WHERE symbol = $1")
            .bind(symbol.as_str())
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
