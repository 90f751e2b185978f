//! Per-symbol worker: one task owns one symbol's lifecycle and runs its
//! ticks, exchange callbacks and operator commands strictly in sequence.

use crate::bus::{EngineEvent, Incident, IncidentKind};
use crate::config::{SymbolConfig, TimeoutConfig};
use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleContext, OpenRequest, SignalExit, SymbolLifecycle};
use crate::ports::{ExchangeUpdate, SnapshotProvider};
use crate::risk::{Proposal, RiskGate};
use crate::strategy::StrategyEntry;
use chrono::Utc;
use ftrade_domain::entities::{HaltReason, HaltState, Order, Position, Signal};
use ftrade_domain::enums::{CloseReason, PositionSide, PositionState};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, error, info, warn};

pub(crate) enum WorkerCommand {
    Exchange(ExchangeUpdate),
    Close {
        reason: CloseReason,
        reply: oneshot::Sender<Result<(), LifecycleError>>,
    },
    Reduce {
        fraction: Decimal,
        reply: oneshot::Sender<Result<(), LifecycleError>>,
    },
}

/// State a worker hands back when it stops.
#[derive(Debug)]
pub(crate) struct WorkerExit {
    pub position: Option<Position>,
    pub working_orders: Vec<Order>,
}

pub(crate) struct SymbolWorker {
    pub config: SymbolConfig,
    pub lifecycle: SymbolLifecycle,
    pub strategy: Arc<StrategyEntry>,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub gate: Arc<RiskGate>,
    pub ctx: Arc<LifecycleContext>,
    pub timeouts: TimeoutConfig,
    pub tick_interval: Duration,
    pub inbox: mpsc::Receiver<WorkerCommand>,
    pub shutdown: watch::Receiver<bool>,
}

impl SymbolWorker {
    pub(crate) async fn run(mut self) -> WorkerExit {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(symbol = %self.config.symbol, strategy = %self.strategy.name(), "Symbol worker started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = ticker.tick() => self.tick().await,
            }
        }

        // Callbacks already queued still belong to this symbol's state.
        while let Ok(command) = self.inbox.try_recv() {
            match command {
                WorkerCommand::Exchange(update) => self.lifecycle.on_exchange_update(update).await,
                WorkerCommand::Close { reply, .. } | WorkerCommand::Reduce { reply, .. } => {
                    let _ = reply.send(Err(LifecycleError::WorkerUnavailable(
                        self.config.symbol.clone(),
                    )));
                }
            }
        }

        info!(symbol = %self.config.symbol, state = ?self.lifecycle.state(), "Symbol worker stopped");
        WorkerExit {
            position: self.lifecycle.position().cloned(),
            working_orders: self.lifecycle.working_orders().cloned().collect(),
        }
    }

    async fn handle(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Exchange(update) => self.lifecycle.on_exchange_update(update).await,
            WorkerCommand::Close { reason, reply } => {
                let result = self.lifecycle.close(reason).await;
                if let Err(e) = &result {
                    warn!(symbol = %self.config.symbol, reason = %reason, error = %e, "Close request failed");
                }
                let _ = reply.send(result);
            }
            WorkerCommand::Reduce { fraction, reply } => {
                let result = self.lifecycle.reduce(fraction).await;
                if let Err(e) = &result {
                    warn!(symbol = %self.config.symbol, fraction = %fraction, error = %e, "Reduce request failed");
                }
                let _ = reply.send(result);
            }
        }
    }

    /// One pass of the pipeline: snapshot, signal, proposal, exits.
    pub(crate) async fn tick(&mut self) {
        let symbol = self.config.symbol.clone();
        self.lifecycle.expire_stale_orders(Utc::now()).await;

        let fetch = self.snapshots.fetch_snapshot(&symbol, self.config.timeframe);
        let snapshot = match timeout(self.timeouts.snapshot(), fetch).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!(symbol = %symbol, error = %e, "Snapshot failed, skipping tick");
                return;
            }
            Err(_) => {
                warn!(symbol = %symbol, timeout = ?self.timeouts.snapshot(), "Snapshot timed out, skipping tick");
                return;
            }
        };
        let Some(price) = snapshot.last_price().filter(|p| *p > Decimal::ZERO) else {
            warn!(symbol = %symbol, "Snapshot has no usable price, skipping tick");
            return;
        };

        self.lifecycle.mark(price).await;
        self.enforce_account_limits().await;

        let propose = self.strategy.strategy().propose(self.strategy.name(), &snapshot);
        let signal = match timeout(self.timeouts.signal(), propose).await {
            Ok(Ok(signal)) => {
                debug!(
                    symbol = %symbol,
                    direction = ?signal.direction,
                    confidence = %signal.confidence,
                    "Signal generated"
                );
                self.ctx.bus.publish(EngineEvent::SignalGenerated {
                    signal: signal.clone(),
                });
                Some(signal)
            }
            Ok(Err(e)) => {
                warn!(symbol = %symbol, error = %e, "Signal failed, no proposal this tick");
                None
            }
            Err(_) => {
                warn!(symbol = %symbol, timeout = ?self.timeouts.signal(), "Signal timed out, no proposal this tick");
                None
            }
        };

        match self.lifecycle.state() {
            None => {
                if let Some(signal) = &signal {
                    self.try_enter(signal, price).await;
                }
            }
            Some(PositionState::Open) => self.check_exits(price, signal.as_ref()).await,
            Some(state) => debug!(symbol = %symbol, state = ?state, "Operation in flight"),
        }
    }

    async fn enforce_account_limits(&self) {
        let (halted, alerts) = {
            let mut book = self.ctx.book.write().await;
            if book.ledger.roll_day(Utc::now()) {
                info!(day_start_equity = %book.ledger.day_start_equity(), "Daily baseline rolled");
            }
            let halted = book
                .enforce_limits(&self.gate)
                .map(|breach| (breach, book.halt.state().clone()));
            (halted, book.check_alerts(&self.gate))
        };
        for alert in alerts {
            warn!(
                kind = %alert.kind,
                level = ?alert.level,
                value = %alert.value,
                threshold = %alert.threshold,
                "{}",
                alert.message
            );
            self.ctx.bus.publish(EngineEvent::RiskAlert(alert));
        }
        if let Some(((reason, detail), state)) = halted {
            self.publish_account_halt(reason, detail, &state).await;
        }
    }

    async fn publish_account_halt(
        &self,
        reason: HaltReason,
        detail: String,
        state: &HaltState,
    ) {
        self.ctx.bus.publish(EngineEvent::TradingHalted {
            symbol: None,
            reason,
            detail,
        });
        if let Err(e) = self.ctx.store.save_halts(state).await {
            error!(error = %e, "Failed to persist halt flags");
            self.ctx.bus.publish(EngineEvent::Incident(Incident::new(
                IncidentKind::PersistenceFailure,
                None,
                format!("save halts: {e}"),
            )));
        }
    }

    async fn try_enter(&mut self, signal: &Signal, price: Decimal) {
        let symbol = self.config.symbol.clone();
        let Some(side) = PositionSide::from_direction(signal.direction) else {
            return;
        };
        if !self.strategy.is_enabled() {
            debug!(symbol = %symbol, strategy = %self.strategy.name(), "Strategy disabled, no proposal");
            return;
        }

        let (admission, halt_state) = {
            let mut book = self.ctx.book.write().await;
            let size = self.gate.config().per_trade_cap.of(book.ledger.equity())
                * self.strategy.size_multiplier();
            let proposal = Proposal {
                symbol: symbol.clone(),
                direction: signal.direction,
                size: Some(size),
                confidence: signal.confidence,
                strategy: self.strategy.name().to_string(),
            };
            let admission = book.admit(&self.gate, &proposal);
            let halt_state = admission.newly_halted.then(|| book.halt.state().clone());
            (admission, halt_state)
        };

        let decision = admission.assessment.decision.clone();
        self.ctx.bus.publish(EngineEvent::RiskAssessed {
            symbol: symbol.clone(),
            decision: decision.clone(),
        });
        if let (Some(state), Some((reason, detail))) = (halt_state, admission.assessment.halt) {
            self.publish_account_halt(reason, detail, &state).await;
        }
        if !decision.is_approved() {
            info!(
                symbol = %symbol,
                verdict = ?decision.verdict,
                reason = %decision.reason,
                "Proposal rejected"
            );
            return;
        }

        let request = OpenRequest {
            side,
            strategy: self.strategy.name().to_string(),
            quantity: decision.approved_size / price,
            reference_price: price,
            confidence: signal.confidence,
        };
        if let Err(e) = self.lifecycle.open(request).await {
            warn!(symbol = %symbol, error = %e, "Open failed");
            if self.lifecycle.state().is_none() {
                self.ctx.book.write().await.ledger.release(&symbol);
            }
        }
    }

    async fn check_exits(&mut self, price: Decimal, signal: Option<&Signal>) {
        let symbol = &self.config.symbol;
        let reconciling = self
            .ctx
            .book
            .read()
            .await
            .halt
            .symbol_halt(symbol)
            .is_some_and(|r| r.reason == HaltReason::ReconciliationMismatch);
        if reconciling {
            debug!(symbol = %symbol, "Exits suspended until reconciliation is resolved");
            return;
        }

        let exit = signal
            .filter(|_| self.strategy.strategy().exits_on_signal())
            .map(|signal| SignalExit {
                signal,
                hold_floor: self.gate.config().hold_confidence_floor,
            });
        let Some(reason) = self.lifecycle.evaluate_exit(price, exit).await else {
            return;
        };

        info!(symbol = %symbol, reason = %reason, price = %price, "Exit triggered");
        if let Err(e) = self.lifecycle.close(reason).await {
            warn!(symbol = %self.config.symbol, reason = %reason, error = %e, "Close failed");
        }
    }
}
