//! Trading halt latch.
//!
//! A halt stays set until an operator resets it; day rollover and restarts
//! do not clear it.

use ftrade_domain::entities::{HaltReason, HaltRecord, HaltState};
use ftrade_domain::value_objects::Symbol;
use tracing::{error, info};

/// Account-wide and per-symbol halt flags.
#[derive(Debug, Clone, Default)]
pub struct TradingHalt {
    state: HaltState,
}

impl TradingHalt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores persisted flags.
    pub fn from_state(state: HaltState) -> Self {
        Self { state }
    }

    /// Checks whether new entries are allowed anywhere.
    pub fn is_trading_allowed(&self) -> bool {
        self.state.account.is_none()
    }

    /// Checks whether new entries are allowed on `symbol`.
    pub fn is_symbol_allowed(&self, symbol: &Symbol) -> bool {
        self.is_trading_allowed() && !self.state.symbols.contains_key(symbol)
    }

    pub fn account_halt(&self) -> Option<&HaltRecord> {
        self.state.account.as_ref()
    }

    pub fn symbol_halt(&self, symbol: &Symbol) -> Option<&HaltRecord> {
        self.state.symbols.get(symbol)
    }

    /// Halts the whole account. The first reason wins; returns `true` only
    /// if the latch was newly set.
    pub fn trip(&mut self, reason: HaltReason, detail: impl Into<String>) -> bool {
        if self.state.account.is_some() {
            return false;
        }
        let record = HaltRecord::new(reason, detail);
        error!(reason = %reason, detail = %record.detail, "Trading halted");
        self.state.account = Some(record);
        true
    }

    /// Halts one symbol. Returns `true` only if the latch was newly set.
    pub fn trip_symbol(
        &mut self,
        symbol: &Symbol,
        reason: HaltReason,
        detail: impl Into<String>,
    ) -> bool {
        if self.state.symbols.contains_key(symbol) {
            return false;
        }
        let record = HaltRecord::new(reason, detail);
        error!(symbol = %symbol, reason = %reason, detail = %record.detail, "Symbol halted");
        self.state.symbols.insert(symbol.clone(), record);
        true
    }

    /// Operator halt of the whole account.
    pub fn manual_trip(&mut self, detail: &str) -> bool {
        self.trip(HaltReason::Manual, format!("manual trip: {detail}"))
    }

    /// Clears the account halt. Symbol halts are left in place.
    pub fn reset(&mut self) -> Option<HaltRecord> {
        let previous = self.state.account.take();
        if let Some(record) = &previous {
            info!(old_reason = %record.reason, "Trading halt reset");
        }
        previous
    }

    pub fn reset_symbol(&mut self, symbol: &Symbol) -> Option<HaltRecord> {
        let previous = self.state.symbols.remove(symbol);
        if let Some(record) = &previous {
            info!(symbol = %symbol, old_reason = %record.reason, "Symbol halt reset");
        }
        previous
    }

    /// Flags in their persisted form.
    pub fn state(&self) -> &HaltState {
        &self.state
    }
}
