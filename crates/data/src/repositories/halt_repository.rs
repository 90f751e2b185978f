//! Halt repository: the persisted account and symbol halt flags.

use ftrade_domain::entities::HaltState;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Repository for the single risk halt document.
#[derive(Clone)]
pub struct HaltRepository {
    pool: Arc<PgPool>,
}

impl HaltRepository {
    /// Creates a new HaltRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads the halt flags, empty when none were ever saved.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn load(&self) -> Result<HaltState, sqlx::Error> {
        let row = sqlx::query("SELECT payload FROM risk_halts WHERE id = 1")
            .fetch_optional(self.pool.as_ref())
            .await?;
        match row {
            Some(row) => {
                let Json(halts): Json<HaltState> = row.try_get("payload")?;
                Ok(halts)
            }
            None => Ok(HaltState::default()),
        }
    }

    /// Replaces the halt flags.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn save(&self, halts: &HaltState) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO risk_halts (id, payload) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
            "#,
        )
        .bind(Json(halts))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
