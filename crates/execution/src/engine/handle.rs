use super::recovery::RecoveryReport;
use super::worker::{WorkerCommand, WorkerExit};
use crate::bus::{BusStats, EngineEvent, Envelope, EventBus, EventHandler, Incident, IncidentKind, Subscription, Topic};
use crate::error::{EngineError, LifecycleError};
use crate::journal::{AggregateStats, TradeJournal, TradeSummary};
use crate::ledger::{LedgerSnapshot, SharedBook};
use crate::lifecycle::BookViews;
use crate::risk::{RiskGate, RiskMetrics};
use crate::strategy::{StrategyRegistry, StrategyStatus};
use ftrade_data::StateStore;
use ftrade_domain::entities::{HaltReason, HaltRecord, HaltState, LedgerEntry, Order, Position};
use ftrade_domain::enums::CloseReason;
use ftrade_domain::value_objects::{Percentage, Symbol};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// What was left when the engine stopped.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub workers_stopped: usize,
    /// Symbols whose worker task panicked.
    pub failed_workers: Vec<Symbol>,
    pub open_positions: Vec<Position>,
    /// Orders still working at the venue.
    pub working_orders: Vec<Order>,
}

impl ShutdownReport {
    pub fn is_flat(&self) -> bool {
        self.open_positions.is_empty() && self.working_orders.is_empty()
    }
}

/// Operator and presentation interface to a running engine.
pub struct EngineHandle {
    pub(crate) bus: EventBus,
    pub(crate) book: SharedBook,
    pub(crate) views: BookViews,
    pub(crate) gate: Arc<RiskGate>,
    pub(crate) registry: Arc<StrategyRegistry>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) journal: TradeJournal,
    pub(crate) inboxes: BTreeMap<Symbol, mpsc::Sender<WorkerCommand>>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) workers: Vec<(Symbol, JoinHandle<WorkerExit>)>,
    pub(crate) router: JoinHandle<()>,
    pub(crate) journal_subscription: Subscription,
    pub(crate) recovery: RecoveryReport,
}

impl EngineHandle {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.inboxes.keys().cloned().collect()
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.views.positions().await
    }

    pub async fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.views.position(symbol).await
    }

    /// Working orders across all symbols.
    pub async fn orders(&self) -> Vec<Order> {
        self.views.orders().await
    }

    pub async fn ledger(&self) -> LedgerSnapshot {
        self.book.read().await.ledger.snapshot()
    }

    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.book.read().await.ledger.entries().to_vec()
    }

    pub async fn risk_metrics(&self) -> RiskMetrics {
        self.book.read().await.metrics(&self.gate)
    }

    pub async fn halt_status(&self) -> HaltState {
        self.book.read().await.halt.state().clone()
    }

    /// Result of the startup reconciliation.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Asks the symbol's worker to close its open position.
    pub async fn request_close(&self, symbol: &Symbol) -> Result<(), EngineError> {
        self.close_with(symbol, CloseReason::Manual).await
    }

    /// Halts new entries account-wide and closes every open position.
    pub async fn close_all(&self, reason: CloseReason) -> Vec<(Symbol, Result<(), EngineError>)> {
        let detail = format!("close all positions ({reason})");
        let tripped = {
            let mut book = self.book.write().await;
            book.halt
                .manual_trip(&detail)
                .then(|| book.halt.state().clone())
        };
        if let Some(state) = tripped {
            self.bus.publish(EngineEvent::TradingHalted {
                symbol: None,
                reason: HaltReason::Manual,
                detail,
            });
            self.persist_halts(&state).await;
        }

        let mut results = Vec::new();
        for position in self.views.positions().await {
            let result = self.close_with(&position.symbol, reason).await;
            results.push((position.symbol, result));
        }
        warn!(positions = results.len(), reason = %reason, "Close-all issued");
        results
    }

    /// Cuts every open position by `reduction` of its quantity with
    /// reduce-only orders. New entries stay allowed.
    pub async fn reduce_positions(
        &self,
        reduction: Percentage,
    ) -> Vec<(Symbol, Result<(), EngineError>)> {
        let mut results = Vec::new();
        for position in self.views.positions().await {
            let fraction = reduction.value();
            let result = self
                .send_command(&position.symbol, |reply| WorkerCommand::Reduce { fraction, reply })
                .await;
            results.push((position.symbol, result));
        }
        warn!(positions = results.len(), reduction = %reduction, "Emergency reduction issued");
        results
    }

    pub fn set_strategy_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.registry.set_enabled(name, enabled)
    }

    pub fn strategies(&self) -> Vec<StrategyStatus> {
        self.registry.list()
    }

    pub fn subscribe<H: EventHandler>(&self, topic: Topic, handler: H) -> Subscription {
        self.bus.subscribe(topic, handler)
    }

    pub fn subscribe_channel(
        &self,
        topic: Topic,
    ) -> (Subscription, mpsc::UnboundedReceiver<Arc<Envelope>>) {
        self.bus.subscribe_channel(topic)
    }

    /// Clears the account halt. Symbol halts stay.
    pub async fn reset_halt(&self) -> Option<HaltRecord> {
        let (previous, state) = {
            let mut book = self.book.write().await;
            let previous = book.halt.reset();
            (previous, book.halt.state().clone())
        };
        if previous.is_some() {
            self.persist_halts(&state).await;
            self.bus.publish(EngineEvent::HaltReset { symbol: None });
        }
        previous
    }

    pub async fn reset_symbol(&self, symbol: &Symbol) -> Option<HaltRecord> {
        let (previous, state) = {
            let mut book = self.book.write().await;
            let previous = book.halt.reset_symbol(symbol);
            (previous, book.halt.state().clone())
        };
        if previous.is_some() {
            self.persist_halts(&state).await;
            self.bus.publish(EngineEvent::HaltReset {
                symbol: Some(symbol.clone()),
            });
        }
        previous
    }

    pub async fn trade_stats(&self) -> AggregateStats {
        self.journal.get_aggregate_stats().await
    }

    pub async fn trades(&self) -> Vec<TradeSummary> {
        self.journal.get_all_summaries().await
    }

    pub fn bus_stats(&self) -> BusStats {
        self.bus.stats()
    }

    /// Stops every worker after its current step and reports what is
    /// still open.
    pub async fn shutdown(self) -> ShutdownReport {
        info!(workers = self.workers.len(), "Engine shutdown requested");
        let _ = self.shutdown_tx.send(true);

        let mut report = ShutdownReport::default();
        for (symbol, worker) in self.workers {
            match worker.await {
                Ok(exit) => {
                    report.workers_stopped += 1;
                    report.open_positions.extend(exit.position);
                    report.working_orders.extend(exit.working_orders);
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Symbol worker failed");
                    report.failed_workers.push(symbol);
                }
            }
        }
        if let Err(e) = self.router.await {
            error!(error = %e, "Update router failed");
        }
        self.journal_subscription.cancel();

        info!(
            workers_stopped = report.workers_stopped,
            open_positions = report.open_positions.len(),
            working_orders = report.working_orders.len(),
            "Engine stopped"
        );
        report
    }

    async fn close_with(&self, symbol: &Symbol, reason: CloseReason) -> Result<(), EngineError> {
        self.send_command(symbol, |reply| WorkerCommand::Close { reason, reply })
            .await
    }

    async fn send_command(
        &self,
        symbol: &Symbol,
        command: impl FnOnce(oneshot::Sender<Result<(), LifecycleError>>) -> WorkerCommand,
    ) -> Result<(), EngineError> {
        let inbox = self
            .inboxes
            .get(symbol)
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.clone()))?;
        let (reply, response) = oneshot::channel();
        inbox
            .send(command(reply))
            .await
            .map_err(|_| LifecycleError::WorkerUnavailable(symbol.clone()))?;
        let result = response
            .await
            .map_err(|_| LifecycleError::WorkerUnavailable(symbol.clone()))?;
        Ok(result?)
    }

    async fn persist_halts(&self, state: &HaltState) {
        if let Err(e) = self.store.save_halts(state).await {
            error!(error = %e, "Failed to persist halt flags");
            self.bus.publish(EngineEvent::Incident(Incident::new(
                IncidentKind::PersistenceFailure,
                None,
                format!("save halts: {e}"),
            )));
        }
    }
}
