use crate::value_objects::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why trading was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    DailyLossLimit,
    MaxDrawdown,
    Manual,
    StuckOrder,
    ReconciliationMismatch,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HaltReason::DailyLossLimit => "DAILY_LOSS_LIMIT",
            HaltReason::MaxDrawdown => "MAX_DRAWDOWN",
            HaltReason::Manual => "MANUAL",
            HaltReason::StuckOrder => "STUCK_ORDER",
            HaltReason::ReconciliationMismatch => "RECONCILIATION_MISMATCH",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltRecord {
    pub reason: HaltReason,
    pub detail: String,
    pub since: DateTime<Utc>,
}

impl HaltRecord {
    pub fn new(reason: HaltReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            since: Utc::now(),
        }
    }
}

/// Account-wide and per-symbol halt flags. Survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltState {
    pub account: Option<HaltRecord>,
    pub symbols: BTreeMap<Symbol, HaltRecord>,
}

impl HaltState {
    pub fn is_clear(&self) -> bool {
        self.account.is_none() && self.symbols.is_empty()
    }
}
