//! Error types and the failure taxonomy used across the engine.

use ftrade_data::StoreError;
use ftrade_domain::enums::PositionState;
use ftrade_domain::error::DomainError;
use ftrade_domain::value_objects::Symbol;
use std::time::Duration;

/// Coarse failure classes. Each drives a different recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Dropped, never retried.
    InvalidInput,
    /// Network or timeout failure. Retried with backoff or skipped.
    TransientIo,
    /// Normal negative outcome of the risk gate.
    RiskRejected,
    /// Venue refused the order. State rolls back.
    ExchangeRejected,
    /// Local state disagrees with the venue. Symbol halts.
    ReconciliationMismatch,
    /// Storage or internal fault.
    Internal,
}

/// Failure reported by the exchange client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Call did not complete within its deadline.
    #[error("exchange call timed out after {0:?}")]
    Timeout(Duration),
    /// Network or protocol failure.
    #[error("exchange transport error: {0}")]
    Transport(String),
    /// Venue rejected the request.
    #[error("exchange rejected order: {0}")]
    Rejected(String),
}

impl ExchangeError {
    /// Whether the same request may be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExchangeError::Rejected(_))
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_retryable() {
            ErrorKind::TransientIo
        } else {
            ErrorKind::ExchangeRejected
        }
    }
}

/// Failure fetching a market snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// Fetch did not complete within its deadline.
    #[error("snapshot fetch timed out after {0:?}")]
    Timeout(Duration),
    /// Provider failed.
    #[error("market data unavailable: {0}")]
    Unavailable(String),
    /// Snapshot had no candles to price from.
    #[error("snapshot for {0} has no candles")]
    Empty(Symbol),
}

/// Failure producing a signal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    /// Source did not answer within its deadline.
    #[error("signal generation timed out after {0:?}")]
    Timeout(Duration),
    /// Source failed.
    #[error("signal source unavailable: {0}")]
    Unavailable(String),
    /// Source returned an invalid signal.
    #[error("invalid signal: {0}")]
    Invalid(#[from] DomainError),
}

/// Errors raised by the per-symbol lifecycle manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    /// Another open or close is still resolving for the symbol.
    #[error("{symbol}: operation in flight ({state:?})")]
    OperationInFlight {
        /// Symbol.
        symbol: Symbol,
        /// Current in-flight state.
        state: PositionState,
    },
    /// A position is already open on the symbol.
    #[error("{0}: position already open")]
    AlreadyOpen(Symbol),
    /// Nothing to close.
    #[error("{0}: no open position")]
    NoPosition(Symbol),
    /// Request was malformed.
    #[error("invalid request: {0}")]
    InvalidInput(String),
    /// Venue rejected the order; state was rolled back.
    #[error("{symbol}: {source}")]
    ExchangeRejected {
        /// Symbol.
        symbol: Symbol,
        /// Rejection reported by the venue.
        source: ExchangeError,
    },
    /// Every attempt failed with a retryable error.
    #[error("{symbol}: gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Symbol.
        symbol: Symbol,
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        last: ExchangeError,
    },
    /// Domain invariant violated.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// The symbol worker is gone.
    #[error("{0}: worker unavailable")]
    WorkerUnavailable(Symbol),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::OperationInFlight { .. }
            | LifecycleError::AlreadyOpen(_)
            | LifecycleError::NoPosition(_)
            | LifecycleError::InvalidInput(_) => ErrorKind::InvalidInput,
            LifecycleError::ExchangeRejected { .. } => ErrorKind::ExchangeRejected,
            LifecycleError::RetriesExhausted { .. } => ErrorKind::TransientIo,
            LifecycleError::Domain(_) | LifecycleError::WorkerUnavailable(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Errors raised while building or driving the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Persistence failed during startup.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Named strategy is not configured.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    /// Symbol is not tracked by the engine.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),
    /// Required collaborator missing from the builder.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    /// Lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
