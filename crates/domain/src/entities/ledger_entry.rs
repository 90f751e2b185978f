use crate::value_objects::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryKind {
    Deposit,
    RealizedPnl,
    Fee,
    Adjustment,
}

/// Append-only balance movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: LedgerEntryKind,
    pub symbol: Option<Symbol>,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

impl LedgerEntry {
    pub fn new(
        kind: LedgerEntryKind,
        symbol: Option<Symbol>,
        amount: Decimal,
        balance_after: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            symbol,
            amount,
            balance_after,
        }
    }
}
