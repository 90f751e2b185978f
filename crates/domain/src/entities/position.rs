use crate::enums::{CloseReason, PositionSide, PositionState};
use crate::value_objects::{Percentage, Symbol, TrailingStop};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Exit levels armed once the entry price is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitLevels {
    pub stop_loss_pct: Percentage,
    pub take_profit_pct: Percentage,
    pub trailing_distance_pct: Percentage,
    pub trailing_activation_pct: Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub side: PositionSide,
    pub state: PositionState,
    pub strategy: String,

    /// Volume-weighted entry price; the reference price until the first fill.
    pub entry_price: Decimal,
    /// Quantity currently held.
    pub quantity: Decimal,
    /// Quantity requested by the opening order.
    pub target_quantity: Decimal,
    /// Exposure budget held for this position in the ledger.
    pub reserved_notional: Decimal,
    pub entry_confidence: Decimal,

    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing: Option<TrailingStop>,

    pub realized_pnl: Decimal,
    pub fees: Decimal,
    pub close_reason: Option<CloseReason>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// A position whose opening order has not filled yet.
    pub fn opening(
        symbol: Symbol,
        side: PositionSide,
        strategy: impl Into<String>,
        reference_price: Decimal,
        target_quantity: Decimal,
        entry_confidence: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PositionId::new(),
            symbol,
            side,
            state: PositionState::Opening,
            strategy: strategy.into(),
            entry_price: reference_price,
            quantity: Decimal::ZERO,
            target_quantity,
            reserved_notional: reference_price * target_quantity,
            entry_confidence,
            stop_loss: None,
            take_profit: None,
            trailing: None,
            realized_pnl: Decimal::ZERO,
            fees: Decimal::ZERO,
            close_reason: None,
            opened_at: now,
            updated_at: now,
        }
    }

    pub fn notional(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// PnL of `quantity` units closed at `exit_price`.
    pub fn pnl_for(&self, quantity: Decimal, exit_price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => (exit_price - self.entry_price) * quantity,
            PositionSide::Short => (self.entry_price - exit_price) * quantity,
        }
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.pnl_for(self.quantity, price)
    }

    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        match self.side {
            PositionSide::Long => (price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - price) / self.entry_price,
        }
    }

    /// Adds an entry fill, updating the volume-weighted entry price.
    pub fn apply_entry_fill(&mut self, quantity: Decimal, price: Decimal) {
        let total = self.quantity + quantity;
        if total.is_zero() {
            return;
        }
        self.entry_price = (self.entry_price * self.quantity + price * quantity) / total;
        self.quantity = total;
        self.updated_at = Utc::now();
    }

    /// Removes closed quantity and books its PnL. Returns the PnL realized.
    pub fn apply_exit_fill(&mut self, quantity: Decimal, price: Decimal) -> Decimal {
        let quantity = quantity.min(self.quantity);
        let pnl = self.pnl_for(quantity, price);
        self.quantity -= quantity;
        self.realized_pnl += pnl;
        self.updated_at = Utc::now();
        pnl
    }

    /// Sets stop-loss, take-profit and the trailing stop from the entry price.
    pub fn arm_exits(&mut self, levels: &ExitLevels) {
        let entry = self.entry_price;
        let (sl, tp) = match self.side {
            PositionSide::Long => (
                entry * (Decimal::ONE - levels.stop_loss_pct.value()),
                entry * (Decimal::ONE + levels.take_profit_pct.value()),
            ),
            PositionSide::Short => (
                entry * (Decimal::ONE + levels.stop_loss_pct.value()),
                entry * (Decimal::ONE - levels.take_profit_pct.value()),
            ),
        };
        self.stop_loss = Some(sl);
        self.take_profit = Some(tp);
        self.trailing = Some(TrailingStop::new(
            self.side,
            entry,
            levels.trailing_distance_pct,
            levels.trailing_activation_pct,
        ));
    }

    pub fn set_state(&mut self, state: PositionState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
