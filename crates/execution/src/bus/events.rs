//! Engine events and topics.

use crate::risk::{RiskAlert, RiskDecision};
use chrono::{DateTime, Utc};
use ftrade_domain::entities::{HaltReason, Order, OrderId, OrderStatus, Position, Signal};
use ftrade_domain::enums::CloseReason;
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event topic. Ordering is guaranteed within a topic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Position and order state changes.
    Lifecycle,
    /// Risk decisions and halts.
    Risk,
    /// Faults needing operator attention.
    Incident,
    /// Signals produced each tick.
    Market,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Lifecycle, Topic::Risk, Topic::Incident, Topic::Market];
}

/// Kind of incident raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    /// Venue rejected an order; state was rolled back.
    ExchangeRejected,
    /// Open or close gave up after max retries.
    StuckOrder,
    /// Persisted state disagrees with the venue.
    ReconciliationMismatch,
    /// A write to the state store failed.
    PersistenceFailure,
}

/// Something an operator must look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Incident ID.
    pub id: Uuid,
    /// Incident kind.
    pub kind: IncidentKind,
    /// Affected symbol, if any.
    pub symbol: Option<Symbol>,
    /// Human readable detail.
    pub detail: String,
    /// Position as it stood when the incident was raised.
    pub position: Option<Position>,
    /// Order involved, if any.
    pub order: Option<Order>,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Incident {
    /// Creates a new incident.
    pub fn new(kind: IncidentKind, symbol: Option<Symbol>, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            symbol,
            detail: detail.into(),
            position: None,
            order: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches the affected position.
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Attaches the affected order.
    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }
}

/// Everything the engine publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Opening order filled; position is live.
    PositionOpened {
        /// Position after the fill.
        position: Position,
    },
    /// Position fully closed.
    PositionClosed {
        /// Final position record (quantity zero, PnL booked).
        position: Position,
        /// Why the close was requested.
        reason: Option<CloseReason>,
        /// Average price of the closing order.
        exit_price: Decimal,
    },
    /// An order moved through its state machine.
    OrderStateChanged {
        /// Order ID.
        order_id: OrderId,
        /// Symbol.
        symbol: Symbol,
        /// Previous status.
        from: OrderStatus,
        /// New status.
        to: OrderStatus,
    },
    /// A strategy produced a signal.
    SignalGenerated {
        /// The signal.
        signal: Signal,
    },
    /// Outcome of a risk gate assessment.
    RiskAssessed {
        /// Symbol assessed.
        symbol: Symbol,
        /// Gate decision.
        decision: RiskDecision,
    },
    /// Trading halted for the account (`symbol == None`) or one symbol.
    TradingHalted {
        /// Halted symbol, `None` for the whole account.
        symbol: Option<Symbol>,
        /// Halt reason.
        reason: HaltReason,
        /// Detail.
        detail: String,
    },
    /// An account risk figure crossed its warning threshold.
    RiskAlert(RiskAlert),
    /// A halt was cleared by an operator.
    HaltReset {
        /// Cleared symbol, `None` for the whole account.
        symbol: Option<Symbol>,
    },
    /// Operator attention required.
    Incident(Incident),
}

impl EngineEvent {
    /// Topic the event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            EngineEvent::PositionOpened { .. }
            | EngineEvent::PositionClosed { .. }
            | EngineEvent::OrderStateChanged { .. } => Topic::Lifecycle,
            EngineEvent::SignalGenerated { .. } => Topic::Market,
            EngineEvent::RiskAssessed { .. }
            | EngineEvent::TradingHalted { .. }
            | EngineEvent::RiskAlert(_)
            | EngineEvent::HaltReset { .. } => Topic::Risk,
            EngineEvent::Incident(_) => Topic::Incident,
        }
    }

    /// Symbol the event concerns, if any.
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            EngineEvent::PositionOpened { position } | EngineEvent::PositionClosed { position, .. } => {
                Some(&position.symbol)
            }
            EngineEvent::OrderStateChanged { symbol, .. } | EngineEvent::RiskAssessed { symbol, .. } => {
                Some(symbol)
            }
            EngineEvent::SignalGenerated { signal } => Some(&signal.symbol),
            EngineEvent::TradingHalted { symbol, .. } | EngineEvent::HaltReset { symbol } => {
                symbol.as_ref()
            }
            EngineEvent::Incident(incident) => incident.symbol.as_ref(),
            EngineEvent::RiskAlert(_) => None,
        }
    }
}

/// Event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event ID.
    pub id: Uuid,
    /// Per-topic publish sequence number, starting at 1.
    pub seq: u64,
    /// Topic.
    pub topic: Topic,
    /// Publish time.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: EngineEvent,
}
