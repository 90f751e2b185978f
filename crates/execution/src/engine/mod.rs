//! Engine assembly and the per-symbol tick loop.
//!
//! [`EngineBuilder::start`] loads persisted state, reconciles it with the
//! venue, then spawns one worker per tracked symbol plus a router that
//! forwards exchange callbacks to the owning worker's inbox.

mod handle;
mod recovery;
mod worker;

pub use handle::*;
pub use recovery::*;

use crate::bus::{EngineEvent, EventBus, Incident, IncidentKind, Topic};
use crate::config::EngineConfig;
use crate::error::{EngineError, ExchangeError};
use crate::journal::TradeJournal;
use crate::ledger::{AccountBook, PortfolioLedger};
use crate::lifecycle::{BookViews, LifecycleContext, SymbolLifecycle};
use crate::ports::{ExchangeClient, ExchangeUpdate, SignalSource, SnapshotProvider};
use crate::risk::{RiskGate, TradingHalt};
use crate::strategy::StrategyRegistry;
use chrono::Utc;
use ftrade_data::{MemoryStateStore, PersistedState, StateStore};
use ftrade_domain::entities::{HaltReason, Order};
use ftrade_domain::value_objects::Symbol;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use worker::{SymbolWorker, WorkerCommand};

const INBOX_CAPACITY: usize = 256;

/// Collects collaborators and starts the engine.
pub struct EngineBuilder {
    config: EngineConfig,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    signal_source: Option<Arc<dyn SignalSource>>,
    exchange: Option<(Arc<dyn ExchangeClient>, mpsc::Receiver<ExchangeUpdate>)>,
    store: Option<Arc<dyn StateStore>>,
    bus: Option<EventBus>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            snapshots: None,
            signal_source: None,
            exchange: None,
            store: None,
            bus: None,
        }
    }

    #[must_use]
    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(provider);
        self
    }

    /// Source used by AI-driven strategies.
    #[must_use]
    pub fn with_signal_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.signal_source = Some(source);
        self
    }

    /// Exchange client plus the stream its ack/fill/reject callbacks arrive on.
    #[must_use]
    pub fn with_exchange(
        mut self,
        client: Arc<dyn ExchangeClient>,
        updates: mpsc::Receiver<ExchangeUpdate>,
    ) -> Self {
        self.exchange = Some((client, updates));
        self
    }

    /// Defaults to an in-memory store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Lets callers subscribe before startup events are published.
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn start(self) -> Result<EngineHandle, EngineError> {
        let config = self.config;
        config.validate()?;

        let registry = Arc::new(StrategyRegistry::from_config(
            &config.strategies,
            self.signal_source,
        )?);
        let snapshots = self
            .snapshots
            .ok_or(EngineError::MissingCollaborator("snapshot provider"))?;
        let (exchange, updates) = self
            .exchange
            .ok_or(EngineError::MissingCollaborator("exchange client"))?;
        let store: Arc<dyn StateStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new()));
        let bus = self.bus.unwrap_or_default();

        let persisted = store.load().await?;
        let exchange_timeout = config.timeouts.exchange();
        let venue = match timeout(exchange_timeout, exchange.open_positions()).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(exchange_timeout)),
        };
        let mut halt = TradingHalt::from_state(persisted.halts.clone());
        let recovery = reconcile(&persisted, venue, &mut halt);

        let book = restore_book(&config, &persisted, halt, store.as_ref()).await?;
        if !recovery.is_clean() {
            let state = book.halt.state().clone();
            store.save_halts(&state).await?;
        }
        for mismatch in &recovery.mismatches {
            bus.publish(EngineEvent::TradingHalted {
                symbol: Some(mismatch.symbol.clone()),
                reason: HaltReason::ReconciliationMismatch,
                detail: mismatch.detail.clone(),
            });
            let incident = Incident::new(
                IncidentKind::ReconciliationMismatch,
                Some(mismatch.symbol.clone()),
                mismatch.detail.clone(),
            );
            let incident = match persisted.positions.get(&mismatch.symbol) {
                Some(position) => incident.with_position(position.clone()),
                None => incident,
            };
            bus.publish(EngineEvent::Incident(incident));
        }
        let book = book.shared();

        let views = BookViews::new();
        let ctx = Arc::new(LifecycleContext {
            exchange,
            store: store.clone(),
            bus: bus.clone(),
            book: book.clone(),
            views: views.clone(),
            settings: config.lifecycle_settings(),
        });
        let gate = Arc::new(RiskGate::new(config.risk.clone()));
        let journal = TradeJournal::new();
        let journal_subscription = bus.subscribe(Topic::Lifecycle, journal.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let PersistedState {
            mut positions,
            orders,
            ..
        } = persisted;
        let mut orders_by_symbol: BTreeMap<Symbol, Vec<Order>> = BTreeMap::new();
        for order in orders {
            orders_by_symbol
                .entry(order.symbol.clone())
                .or_default()
                .push(order);
        }

        let mut inboxes = BTreeMap::new();
        let mut workers = Vec::new();
        for symbol_config in &config.symbols {
            let symbol = symbol_config.symbol.clone();
            let strategy = registry
                .get(&symbol_config.strategy)
                .ok_or_else(|| EngineError::UnknownStrategy(symbol_config.strategy.clone()))?;
            let lifecycle = SymbolLifecycle::new(symbol.clone(), ctx.clone()).with_state(
                positions.remove(&symbol),
                orders_by_symbol.remove(&symbol).unwrap_or_default(),
            );
            {
                let working: Vec<&Order> = lifecycle.working_orders().collect();
                views.publish(&symbol, lifecycle.position(), &working).await;
            }

            let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
            inboxes.insert(symbol.clone(), inbox_tx);
            let worker = SymbolWorker {
                config: symbol_config.clone(),
                lifecycle,
                strategy,
                snapshots: snapshots.clone(),
                gate: gate.clone(),
                ctx: ctx.clone(),
                timeouts: config.timeouts.clone(),
                tick_interval: config.tick_interval(),
                inbox: inbox_rx,
                shutdown: shutdown_rx.clone(),
            };
            workers.push((symbol, tokio::spawn(worker.run())));
        }
        for symbol in positions.keys() {
            warn!(symbol = %symbol, "Persisted position has no configured worker");
        }

        let router = tokio::spawn(route_updates(updates, inboxes.clone(), shutdown_rx));

        info!(
            symbols = workers.len(),
            strategies = registry.list().len(),
            restored = recovery.restored.len(),
            halted = recovery.mismatches.len(),
            "Engine started"
        );
        Ok(EngineHandle {
            bus,
            book,
            views,
            gate,
            registry,
            store,
            journal,
            inboxes,
            shutdown_tx,
            workers,
            router,
            journal_subscription,
            recovery,
        })
    }
}

/// Builds the account book from the persisted ledger, seeding a deposit on
/// first start, and re-reserves exposure for recovered positions.
async fn restore_book(
    config: &EngineConfig,
    persisted: &PersistedState,
    halt: TradingHalt,
    store: &dyn StateStore,
) -> Result<AccountBook, EngineError> {
    let now = Utc::now();
    let ledger = if persisted.ledger.is_empty() {
        let ledger = PortfolioLedger::new(config.initial_balance, now);
        for entry in ledger.entries() {
            store.append_ledger_entry(entry).await?;
        }
        ledger
    } else {
        PortfolioLedger::restore(persisted.ledger.clone(), now)
    };

    let mut book = AccountBook::new(ledger, halt);
    for position in persisted.positions.values() {
        book.ledger
            .reserve(&position.symbol, position.reserved_notional);
        if !position.quantity.is_zero() {
            book.ledger.mark(position, position.entry_price);
        }
    }
    Ok(book)
}

/// Forwards each exchange callback to the inbox of the symbol it names.
async fn route_updates(
    mut updates: mpsc::Receiver<ExchangeUpdate>,
    inboxes: BTreeMap<Symbol, mpsc::Sender<WorkerCommand>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    debug!("Exchange update stream closed");
                    break;
                };
                match inboxes.get(&update.symbol) {
                    Some(inbox) => {
                        let symbol = update.symbol.clone();
                        if inbox.send(WorkerCommand::Exchange(update)).await.is_err() {
                            warn!(symbol = %symbol, "Worker inbox closed, update dropped");
                        }
                    }
                    None => {
                        warn!(
                            symbol = %update.symbol,
                            order_id = %update.order_id,
                            "Update for an untracked symbol"
                        );
                    }
                }
            }
        }
    }
}
