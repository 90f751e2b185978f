//! Ledger repository: append-only balance history.

use ftrade_domain::entities::{LedgerEntry, LedgerEntryKind};
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

fn kind_label(kind: LedgerEntryKind) -> &'static str {
    match kind {
        LedgerEntryKind::Deposit => "DEPOSIT",
        LedgerEntryKind::RealizedPnl => "REALIZED_PNL",
        LedgerEntryKind::Fee => "FEE",
        LedgerEntryKind::Adjustment => "ADJUSTMENT",
    }
}

fn parse_kind(label: &str) -> Result<LedgerEntryKind, sqlx::Error> {
    match label {
        "DEPOSIT" => Ok(LedgerEntryKind::Deposit),
        "REALIZED_PNL" => Ok(LedgerEntryKind::RealizedPnl),
        "FEE" => Ok(LedgerEntryKind::Fee),
        "ADJUSTMENT" => Ok(LedgerEntryKind::Adjustment),
        other => Err(sqlx::Error::Decode(
            format!("unknown ledger entry kind: {other}").into(),
        )),
    }
}

/// Repository for ledger entries.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: Arc<PgPool>,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let symbol: Option<String> = row.try_get("symbol")?;
        Ok(LedgerEntry {
            id: row.try_get("id")?,
            timestamp: row.try_get("recorded_at")?,
            kind: parse_kind(&kind)?,
            symbol: symbol.and_then(|s| Symbol::new(s).ok()),
            amount: row.try_get::<Decimal, _>("amount")?,
            balance_after: row.try_get::<Decimal, _>("balance_after")?,
        })
    }

    /// Loads every ledger entry in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM ledger_entries ORDER BY seq")
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(Self::entry_from_row).collect()
    }

    /// Appends a ledger entry.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn append(&self, entry: &LedgerEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, recorded_at, kind, symbol, amount, balance_after)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(kind_label(entry.kind))
        .bind(entry.symbol.as_ref().map(|s| s.as_str().to_string()))
        .bind(entry.amount)
        .bind(entry.balance_after)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
