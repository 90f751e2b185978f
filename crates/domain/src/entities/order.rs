use crate::entities::position::PositionId;
use crate::enums::{OrderPurpose, OrderSide, OrderType};
use crate::error::DomainError;
use crate::value_objects::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier assigned by the venue once it accepts an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeOrderId(pub String);

impl fmt::Display for ExchangeOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order state machine.
///
/// ```text
/// CREATED -> SUBMITTED -> ACKNOWLEDGED -> PARTIALLY_FILLED -> FILLED
///                     \-> REJECTED     \-> FILLED          \-> CANCELLED
///                                      \-> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Submitted,
    Acknowledged,
    Rejected,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Filled | OrderStatus::Cancelled
        )
    }

    /// Order is live at the venue (may still fill or be cancelled).
    pub fn is_working(self) -> bool {
        matches!(
            self,
            OrderStatus::Submitted | OrderStatus::Acknowledged | OrderStatus::PartiallyFilled
        )
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Submitted)
                | (Submitted, Acknowledged)
                | (Submitted, Rejected)
                | (Acknowledged, PartiallyFilled)
                | (Acknowledged, Filled)
                | (Acknowledged, Cancelled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Acknowledged => "ACKNOWLEDGED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Result of applying one fill to an order.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    /// Statuses entered while applying the fill, in order.
    pub transitions: Vec<OrderStatus>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub position_id: Option<PositionId>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub purpose: OrderPurpose,
    pub order_type: OrderType,
    pub requested_quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fees: Decimal,
    pub status: OrderStatus,
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub reason: Option<String>,
    pub history: Vec<OrderStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        symbol: Symbol,
        side: OrderSide,
        purpose: OrderPurpose,
        order_type: OrderType,
        quantity: Decimal,
    ) -> Result<Self, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositive {
                field: "quantity",
                value: quantity,
            });
        }
        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            position_id: None,
            symbol,
            side,
            purpose,
            order_type,
            requested_quantity: quantity,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            fees: Decimal::ZERO,
            status: OrderStatus::Created,
            exchange_order_id: None,
            reason: None,
            history: vec![OrderStatus::Created],
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn for_position(mut self, position_id: PositionId) -> Self {
        self.position_id = Some(position_id);
        self
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.requested_quantity - self.filled_quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `next`, refusing anything the state machine does not allow.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.history.push(next);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_submitted(&mut self) -> Result<(), DomainError> {
        self.transition(OrderStatus::Submitted)
    }

    pub fn acknowledge(
        &mut self,
        exchange_order_id: Option<ExchangeOrderId>,
    ) -> Result<(), DomainError> {
        self.transition(OrderStatus::Acknowledged)?;
        if exchange_order_id.is_some() {
            self.exchange_order_id = exchange_order_id;
        }
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Rejected)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Cancelled)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Applies a (partial) fill. A fill reported while the order is still
    /// `SUBMITTED` implies the venue accepted it, so `ACKNOWLEDGED` is
    /// recorded first.
    pub fn apply_fill(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) -> Result<FillOutcome, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositive {
                field: "fill quantity",
                value: quantity,
            });
        }
        if price <= Decimal::ZERO {
            return Err(DomainError::NonPositive {
                field: "fill price",
                value: price,
            });
        }
        let remaining = self.remaining_quantity();
        if quantity > remaining {
            return Err(DomainError::Overfill {
                fill: quantity,
                remaining,
            });
        }

        let mut transitions = Vec::new();
        if self.status == OrderStatus::Submitted {
            self.transition(OrderStatus::Acknowledged)?;
            transitions.push(OrderStatus::Acknowledged);
        }

        let completed = quantity == remaining;
        let next = if completed {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if self.status != next {
            self.transition(next)?;
            transitions.push(next);
        } else if !matches!(self.status, OrderStatus::PartiallyFilled) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let previous_notional =
            self.average_fill_price.unwrap_or(Decimal::ZERO) * self.filled_quantity;
        self.filled_quantity += quantity;
        self.average_fill_price = Some((previous_notional + price * quantity) / self.filled_quantity);
        self.fees += fee;
        self.updated_at = Utc::now();

        Ok(FillOutcome {
            transitions,
            quantity,
            price,
            fee,
            completed,
        })
    }
}
