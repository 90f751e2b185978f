//! Per-symbol position and order state machine.
//!
//! A [`SymbolLifecycle`] is owned by exactly one symbol worker, so ticks,
//! exchange callbacks and operator commands for a symbol never interleave.

use super::{BookViews, SignalExit, evaluate_exit};
use crate::bus::{EngineEvent, EventBus, Incident, IncidentKind};
use crate::error::{ExchangeError, LifecycleError};
use crate::ledger::SharedBook;
use crate::ports::{ExchangeClient, ExchangeUpdate, ExchangeUpdateKind, OrderRequest};
use crate::retry::RetryConfig;
use chrono::{DateTime, Utc};
use ftrade_data::StateStore;
use ftrade_domain::entities::{
    ExchangeOrderId, ExitLevels, HaltReason, LedgerEntry, Order, OrderId, OrderStatus, Position,
    PositionId,
};
use ftrade_domain::enums::{
    CloseReason, OrderPurpose, OrderSide, OrderType, PositionSide, PositionState,
};
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Order handling parameters.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Levels armed when an opening order fills.
    pub exit_levels: ExitLevels,
    /// Submission retry policy.
    pub retry: RetryConfig,
    /// Deadline for each exchange call.
    pub exchange_timeout: Duration,
    /// Working orders older than this are cancelled.
    pub order_ttl: Duration,
}

/// Collaborators shared by every symbol's lifecycle.
pub struct LifecycleContext {
    pub exchange: Arc<dyn ExchangeClient>,
    pub store: Arc<dyn StateStore>,
    pub bus: EventBus,
    pub book: SharedBook,
    pub views: BookViews,
    pub settings: LifecycleSettings,
}

/// Parameters of an approved entry.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub side: PositionSide,
    pub strategy: String,
    pub quantity: Decimal,
    /// Price the size was computed from.
    pub reference_price: Decimal,
    pub confidence: Decimal,
}

enum SubmitOutcome {
    Accepted,
    Rejected(ExchangeError),
    Exhausted { attempts: u32, last: ExchangeError },
}

/// Authoritative position and working orders for one symbol.
pub struct SymbolLifecycle {
    symbol: Symbol,
    ctx: Arc<LifecycleContext>,
    position: Option<Position>,
    orders: BTreeMap<OrderId, Order>,
    cancel_requested: HashSet<OrderId>,
    /// Orders whose submit timed out; the venue may still execute them.
    timed_out: BTreeMap<OrderId, Order>,
}

impl SymbolLifecycle {
    pub fn new(symbol: Symbol, ctx: Arc<LifecycleContext>) -> Self {
        Self {
            symbol,
            ctx,
            position: None,
            orders: BTreeMap::new(),
            cancel_requested: HashSet::new(),
            timed_out: BTreeMap::new(),
        }
    }

    /// Seeds recovered state. Terminal orders are dropped.
    #[must_use]
    pub fn with_state(mut self, position: Option<Position>, orders: Vec<Order>) -> Self {
        self.position = position;
        self.orders = orders
            .into_iter()
            .filter(|o| !o.is_terminal())
            .map(|o| (o.id, o))
            .collect();
        self
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// `None` means no position (NONE).
    pub fn state(&self) -> Option<PositionState> {
        self.position.as_ref().map(|p| p.state)
    }

    pub fn working_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Opens a position. Returns once the opening order is accepted; fills
    /// arrive through [`Self::on_exchange_update`].
    pub async fn open(&mut self, request: OpenRequest) -> Result<PositionId, LifecycleError> {
        if let Some(position) = &self.position {
            return Err(if position.state.is_in_flight() {
                LifecycleError::OperationInFlight {
                    symbol: self.symbol.clone(),
                    state: position.state,
                }
            } else {
                LifecycleError::AlreadyOpen(self.symbol.clone())
            });
        }
        if request.quantity <= Decimal::ZERO || request.reference_price <= Decimal::ZERO {
            return Err(LifecycleError::InvalidInput(format!(
                "quantity {} at price {}",
                request.quantity, request.reference_price
            )));
        }

        let position = Position::opening(
            self.symbol.clone(),
            request.side,
            request.strategy,
            request.reference_price,
            request.quantity,
            request.confidence,
        );
        let position_id = position.id;
        info!(
            symbol = %self.symbol,
            position_id = %position_id,
            side = ?request.side,
            quantity = %request.quantity,
            reference_price = %request.reference_price,
            "Opening position"
        );
        self.position = Some(position);
        self.persist_position().await;
        self.sync_views().await;

        let outcome = match self
            .submit_with_retry(
                OrderPurpose::Open,
                request.side.entry_side(),
                request.quantity,
                position_id,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.drop_position(true).await;
                return Err(e);
            }
        };

        match outcome {
            SubmitOutcome::Accepted => Ok(position_id),
            SubmitOutcome::Rejected(source) => {
                let position = self.drop_position(true).await;
                self.raise_incident(
                    Incident::new(
                        IncidentKind::ExchangeRejected,
                        Some(self.symbol.clone()),
                        format!("open rejected: {source}"),
                    ),
                    position,
                );
                Err(LifecycleError::ExchangeRejected {
                    symbol: self.symbol.clone(),
                    source,
                })
            }
            SubmitOutcome::Exhausted { attempts, last } => {
                let position = self.drop_position(true).await;
                let detail = format!("open gave up after {attempts} attempts: {last}");
                self.raise_incident(
                    Incident::new(
                        IncidentKind::StuckOrder,
                        Some(self.symbol.clone()),
                        detail.clone(),
                    ),
                    position,
                );
                self.halt_symbol(HaltReason::StuckOrder, detail).await;
                Err(LifecycleError::RetriesExhausted {
                    symbol: self.symbol.clone(),
                    attempts,
                    last,
                })
            }
        }
    }

    /// Closes the open position with a reduce-side market order.
    pub async fn close(&mut self, reason: CloseReason) -> Result<(), LifecycleError> {
        let (position_id, quantity, exit_side) = self.begin_exit(reason, Decimal::ONE)?;
        info!(
            symbol = %self.symbol,
            position_id = %position_id,
            reason = %reason,
            quantity = %quantity,
            "Closing position"
        );
        self.submit_exit(OrderPurpose::Close, exit_side, quantity, position_id)
            .await
    }

    /// Cuts the open position by `fraction` of its quantity. The remainder
    /// returns to OPEN with its exit levels unchanged.
    pub async fn reduce(&mut self, fraction: Decimal) -> Result<(), LifecycleError> {
        if fraction <= Decimal::ZERO || fraction >= Decimal::ONE {
            return Err(LifecycleError::InvalidInput(format!(
                "reduction fraction {fraction} outside (0, 1)"
            )));
        }
        let (position_id, quantity, exit_side) =
            self.begin_exit(CloseReason::Emergency, fraction)?;
        info!(
            symbol = %self.symbol,
            position_id = %position_id,
            fraction = %fraction,
            quantity = %quantity,
            "Reducing position"
        );
        self.submit_exit(OrderPurpose::Reduce, exit_side, quantity, position_id)
            .await
    }

    fn begin_exit(
        &mut self,
        reason: CloseReason,
        fraction: Decimal,
    ) -> Result<(PositionId, Decimal, OrderSide), LifecycleError> {
        match self.position.as_mut() {
            None => Err(LifecycleError::NoPosition(self.symbol.clone())),
            Some(p) if p.state != PositionState::Open => Err(LifecycleError::OperationInFlight {
                symbol: self.symbol.clone(),
                state: p.state,
            }),
            Some(p) => {
                let quantity = (p.quantity * fraction).normalize();
                if quantity <= Decimal::ZERO {
                    return Err(LifecycleError::InvalidInput(format!(
                        "nothing to exit from quantity {}",
                        p.quantity
                    )));
                }
                p.set_state(PositionState::Closing);
                p.close_reason = Some(reason);
                Ok((p.id, quantity, p.side.exit_side()))
            }
        }
    }

    async fn submit_exit(
        &mut self,
        purpose: OrderPurpose,
        side: OrderSide,
        quantity: Decimal,
        position_id: PositionId,
    ) -> Result<(), LifecycleError> {
        self.persist_position().await;
        self.sync_views().await;

        let outcome = match self
            .submit_with_retry(purpose, side, quantity, position_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.revert_to_open().await;
                return Err(e);
            }
        };

        let label = purpose_label(purpose);
        match outcome {
            SubmitOutcome::Accepted => Ok(()),
            SubmitOutcome::Rejected(source) => {
                self.revert_to_open().await;
                self.raise_incident(
                    Incident::new(
                        IncidentKind::ExchangeRejected,
                        Some(self.symbol.clone()),
                        format!("{label} rejected: {source}"),
                    ),
                    self.position.clone(),
                );
                Err(LifecycleError::ExchangeRejected {
                    symbol: self.symbol.clone(),
                    source,
                })
            }
            SubmitOutcome::Exhausted { attempts, last } => {
                let detail = format!("{label} gave up after {attempts} attempts: {last}");
                let position = if purpose == OrderPurpose::Close {
                    // Exposure stays reserved: the venue may still hold the position.
                    self.drop_position(false).await
                } else {
                    self.revert_to_open().await;
                    self.position.clone()
                };
                self.raise_incident(
                    Incident::new(
                        IncidentKind::StuckOrder,
                        Some(self.symbol.clone()),
                        detail.clone(),
                    ),
                    position,
                );
                self.halt_symbol(HaltReason::StuckOrder, detail).await;
                Err(LifecycleError::RetriesExhausted {
                    symbol: self.symbol.clone(),
                    attempts,
                    last,
                })
            }
        }
    }

    async fn submit_with_retry(
        &mut self,
        purpose: OrderPurpose,
        side: OrderSide,
        quantity: Decimal,
        position_id: PositionId,
    ) -> Result<SubmitOutcome, LifecycleError> {
        let exchange = self.ctx.exchange.clone();
        let timeout = self.ctx.settings.exchange_timeout;
        let mut backoff = self.ctx.settings.retry.backoff();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let mut order = Order::new(
                self.symbol.clone(),
                side,
                purpose,
                OrderType::Market,
                quantity,
            )?
            .for_position(position_id);
            order.mark_submitted()?;
            self.publish_transition(&order, OrderStatus::Created, OrderStatus::Submitted);
            self.persist_order(&order).await;

            let request = OrderRequest {
                client_order_id: order.id,
                symbol: self.symbol.clone(),
                side,
                order_type: OrderType::Market,
                quantity,
                limit_price: None,
                reduce_only: purpose != OrderPurpose::Open,
            };
            let result = match tokio::time::timeout(timeout, exchange.submit_order(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::Timeout(timeout)),
            };

            match result {
                Ok(exchange_order_id) => {
                    info!(
                        symbol = %self.symbol,
                        order_id = %order.id,
                        exchange_order_id = %exchange_order_id,
                        purpose = ?purpose,
                        attempt = attempts,
                        "Order accepted"
                    );
                    order.exchange_order_id = Some(exchange_order_id);
                    self.persist_order(&order).await;
                    self.orders.insert(order.id, order);
                    self.sync_views().await;
                    return Ok(SubmitOutcome::Accepted);
                }
                Err(e) => {
                    let order_id = order.id;
                    order.reject(e.to_string())?;
                    self.publish_transition(&order, OrderStatus::Submitted, OrderStatus::Rejected);
                    self.persist_order(&order).await;
                    if matches!(e, ExchangeError::Timeout(_)) {
                        self.cancel_timed_out(order).await;
                    }

                    if !e.is_retryable() {
                        warn!(
                            symbol = %self.symbol,
                            order_id = %order_id,
                            error = %e,
                            "Order rejected by exchange"
                        );
                        return Ok(SubmitOutcome::Rejected(e));
                    }
                    match backoff.next_delay() {
                        Some(delay) => {
                            warn!(
                                symbol = %self.symbol,
                                attempt = attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Order submission failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(
                                symbol = %self.symbol,
                                attempts,
                                error = %e,
                                "Order submission retries exhausted"
                            );
                            return Ok(SubmitOutcome::Exhausted { attempts, last: e });
                        }
                    }
                }
            }
        }
    }

    /// The venue may still execute an order whose submit timed out, so ask it
    /// to cancel and remember the order until the venue confirms.
    async fn cancel_timed_out(&mut self, order: Order) {
        let order_id = order.id;
        self.timed_out.insert(order_id, order);
        let call = self.ctx.exchange.cancel_order(&self.symbol, order_id);
        match tokio::time::timeout(self.ctx.settings.exchange_timeout, call).await {
            Ok(Ok(())) => {
                info!(symbol = %self.symbol, order_id = %order_id, "Cancel requested for timed-out order");
            }
            Ok(Err(e)) => {
                warn!(symbol = %self.symbol, order_id = %order_id, error = %e, "Cancel of timed-out order failed");
            }
            Err(_) => {
                warn!(symbol = %self.symbol, order_id = %order_id, "Cancel of timed-out order timed out");
            }
        }
    }

    /// Applies an ack, fill, reject or cancel reported by the exchange.
    pub async fn on_exchange_update(&mut self, update: ExchangeUpdate) {
        if self.timed_out.contains_key(&update.order_id) {
            self.on_timed_out_update(update).await;
            return;
        }
        let Some(mut order) = self.orders.remove(&update.order_id) else {
            warn!(
                symbol = %self.symbol,
                order_id = %update.order_id,
                kind = ?update.kind,
                "Update for unknown or terminal order ignored"
            );
            return;
        };

        let applied = match update.kind {
            ExchangeUpdateKind::Acknowledged { exchange_order_id } => {
                self.apply_ack(&mut order, exchange_order_id)
            }
            ExchangeUpdateKind::Rejected { reason } => self.apply_reject(&mut order, reason).await,
            ExchangeUpdateKind::Fill {
                quantity,
                price,
                fee,
            } => self.apply_fill(&mut order, quantity, price, fee).await,
            ExchangeUpdateKind::Cancelled { reason } => self.apply_cancel(&mut order, reason).await,
        };
        if let Err(e) = applied {
            warn!(
                symbol = %self.symbol,
                order_id = %order.id,
                status = %order.status,
                error = %e,
                "Exchange update refused"
            );
        }

        self.persist_order(&order).await;
        if order.is_terminal() {
            self.cancel_requested.remove(&order.id);
        } else {
            self.orders.insert(order.id, order);
        }
        self.persist_position().await;
        self.sync_views().await;
    }

    /// A fill here means the venue holds quantity the local position does not
    /// account for. Local state is left alone and the symbol halts.
    async fn on_timed_out_update(&mut self, update: ExchangeUpdate) {
        match update.kind {
            ExchangeUpdateKind::Fill {
                quantity,
                price,
                fee,
            } => {
                let Some(order) = self.timed_out.get(&update.order_id).cloned() else {
                    return;
                };
                let detail = format!(
                    "timed-out {} order {} filled {quantity} @ {price}",
                    purpose_label(order.purpose),
                    order.id
                );
                error!(symbol = %self.symbol, order_id = %order.id, "Late fill on timed-out order");

                let fee_entry = {
                    let mut book = self.ctx.book.write().await;
                    if order.purpose == OrderPurpose::Open {
                        let held = book
                            .ledger
                            .exposure(&self.symbol)
                            .map_or(Decimal::ZERO, |e| e.exposure());
                        book.ledger.reserve(&self.symbol, held + quantity * price);
                    }
                    (!fee.is_zero()).then(|| book.ledger.record_fee(&self.symbol, fee))
                };
                if let Some(entry) = fee_entry {
                    self.append_ledger(&entry).await;
                }

                self.raise_incident(
                    Incident::new(
                        IncidentKind::ReconciliationMismatch,
                        Some(self.symbol.clone()),
                        detail.clone(),
                    )
                    .with_order(order),
                    self.position.clone(),
                );
                self.halt_symbol(HaltReason::ReconciliationMismatch, detail)
                    .await;
            }
            ExchangeUpdateKind::Cancelled { reason } | ExchangeUpdateKind::Rejected { reason } => {
                self.timed_out.remove(&update.order_id);
                info!(
                    symbol = %self.symbol,
                    order_id = %update.order_id,
                    reason = %reason,
                    "Timed-out order confirmed dead"
                );
            }
            ExchangeUpdateKind::Acknowledged { .. } => {
                warn!(
                    symbol = %self.symbol,
                    order_id = %update.order_id,
                    "Venue acknowledged a timed-out order"
                );
            }
        }
    }

    fn apply_ack(
        &mut self,
        order: &mut Order,
        exchange_order_id: ExchangeOrderId,
    ) -> Result<(), LifecycleError> {
        if order.status != OrderStatus::Submitted {
            debug!(order_id = %order.id, status = %order.status, "Late acknowledgement ignored");
            return Ok(());
        }
        order.acknowledge(Some(exchange_order_id))?;
        self.publish_transition(order, OrderStatus::Submitted, OrderStatus::Acknowledged);
        Ok(())
    }

    async fn apply_reject(&mut self, order: &mut Order, reason: String) -> Result<(), LifecycleError> {
        let from = order.status;
        order.reject(reason.clone())?;
        self.publish_transition(order, from, OrderStatus::Rejected);
        if !self.owns(order) {
            return Ok(());
        }

        match order.purpose {
            OrderPurpose::Open => {
                let position = self.drop_position(true).await;
                self.raise_incident(
                    Incident::new(
                        IncidentKind::ExchangeRejected,
                        Some(self.symbol.clone()),
                        format!("open rejected: {reason}"),
                    )
                    .with_order(order.clone()),
                    position,
                );
            }
            OrderPurpose::Close => {
                self.revert_to_open().await;
                self.raise_incident(
                    Incident::new(
                        IncidentKind::ExchangeRejected,
                        Some(self.symbol.clone()),
                        format!("close rejected: {reason}"),
                    )
                    .with_order(order.clone()),
                    self.position.clone(),
                );
            }
            OrderPurpose::Reduce => {
                self.finish_reduce(order.average_fill_price).await;
                self.raise_incident(
                    Incident::new(
                        IncidentKind::ExchangeRejected,
                        Some(self.symbol.clone()),
                        format!("reduce rejected: {reason}"),
                    )
                    .with_order(order.clone()),
                    self.position.clone(),
                );
            }
        }
        Ok(())
    }

    async fn apply_fill(
        &mut self,
        order: &mut Order,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) -> Result<(), LifecycleError> {
        let mut previous = order.status;
        let outcome = order.apply_fill(quantity, price, fee)?;
        for status in &outcome.transitions {
            self.publish_transition(order, previous, *status);
            previous = *status;
        }
        debug!(
            symbol = %self.symbol,
            order_id = %order.id,
            quantity = %quantity,
            price = %price,
            completed = outcome.completed,
            "Fill applied"
        );

        if !fee.is_zero() {
            let entry = self.ctx.book.write().await.ledger.record_fee(&self.symbol, fee);
            self.append_ledger(&entry).await;
        }
        if !self.owns(order) {
            return Ok(());
        }
        let Some(position) = self.position.as_mut() else {
            return Ok(());
        };
        position.fees += fee;

        match order.purpose {
            OrderPurpose::Open => {
                position.apply_entry_fill(quantity, price);
                if outcome.completed {
                    position.arm_exits(&self.ctx.settings.exit_levels);
                    position.set_state(PositionState::Open);
                    let opened = position.clone();
                    self.ctx.book.write().await.ledger.mark(&opened, price);
                    info!(
                        symbol = %self.symbol,
                        position_id = %opened.id,
                        entry_price = %opened.entry_price,
                        quantity = %opened.quantity,
                        stop_loss = ?opened.stop_loss,
                        take_profit = ?opened.take_profit,
                        "Position opened"
                    );
                    self.ctx
                        .bus
                        .publish(EngineEvent::PositionOpened { position: opened });
                }
            }
            OrderPurpose::Close | OrderPurpose::Reduce => {
                let pnl = position.apply_exit_fill(quantity, price);
                let flat = position.quantity.is_zero();
                let closes = flat || (outcome.completed && order.purpose == OrderPurpose::Close);
                let snapshot = position.clone();

                let entry = {
                    let mut book = self.ctx.book.write().await;
                    let entry = book.ledger.record_realized(&self.symbol, pnl);
                    if closes {
                        book.ledger.release(&self.symbol);
                    } else {
                        book.ledger.mark(&snapshot, price);
                    }
                    entry
                };
                self.append_ledger(&entry).await;

                if closes {
                    self.position = None;
                    let exit_price = order.average_fill_price.unwrap_or(price);
                    info!(
                        symbol = %self.symbol,
                        position_id = %snapshot.id,
                        exit_price = %exit_price,
                        realized_pnl = %snapshot.realized_pnl,
                        fees = %snapshot.fees,
                        reason = ?snapshot.close_reason,
                        "Position closed"
                    );
                    self.ctx.bus.publish(EngineEvent::PositionClosed {
                        reason: snapshot.close_reason,
                        position: snapshot,
                        exit_price,
                    });
                } else if outcome.completed {
                    self.finish_reduce(order.average_fill_price).await;
                }
            }
        }
        Ok(())
    }

    async fn apply_cancel(&mut self, order: &mut Order, reason: String) -> Result<(), LifecycleError> {
        // A cancel on an unacknowledged order implies the venue accepted it.
        if order.status == OrderStatus::Submitted {
            order.acknowledge(None)?;
            self.publish_transition(order, OrderStatus::Submitted, OrderStatus::Acknowledged);
        }
        let from = order.status;
        order.cancel(reason.clone())?;
        self.publish_transition(order, from, OrderStatus::Cancelled);
        if !self.owns(order) {
            return Ok(());
        }

        match order.purpose {
            OrderPurpose::Open => {
                let Some(position) = self.position.as_mut() else {
                    return Ok(());
                };
                if position.quantity.is_zero() {
                    info!(symbol = %self.symbol, reason = %reason, "Open order cancelled unfilled");
                    self.drop_position(true).await;
                } else {
                    // Keep what filled; shrink the reservation to match.
                    position.arm_exits(&self.ctx.settings.exit_levels);
                    position.set_state(PositionState::Open);
                    let opened = position.clone();
                    {
                        let mut book = self.ctx.book.write().await;
                        book.ledger
                            .reserve(&self.symbol, opened.notional(opened.entry_price));
                        book.ledger.mark(&opened, opened.entry_price);
                    }
                    info!(
                        symbol = %self.symbol,
                        quantity = %opened.quantity,
                        target = %opened.target_quantity,
                        "Open order cancelled after partial fill"
                    );
                    self.ctx
                        .bus
                        .publish(EngineEvent::PositionOpened { position: opened });
                }
            }
            OrderPurpose::Close => {
                info!(symbol = %self.symbol, reason = %reason, "Close order cancelled");
                self.revert_to_open().await;
            }
            OrderPurpose::Reduce => {
                info!(symbol = %self.symbol, reason = %reason, "Reduce order cancelled");
                self.finish_reduce(order.average_fill_price).await;
            }
        }
        Ok(())
    }

    /// Cancels working orders older than the configured TTL.
    pub async fn expire_stale_orders(&mut self, now: DateTime<Utc>) {
        let ttl = self.ctx.settings.order_ttl;
        let stale: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.status.is_working() && !self.cancel_requested.contains(&o.id))
            .filter(|o| (now - o.created_at).to_std().unwrap_or_default() >= ttl)
            .map(|o| o.id)
            .collect();

        for order_id in stale {
            let call = self.ctx.exchange.cancel_order(&self.symbol, order_id);
            match tokio::time::timeout(self.ctx.settings.exchange_timeout, call).await {
                Ok(Ok(())) => {
                    info!(symbol = %self.symbol, order_id = %order_id, "Stale order cancel requested");
                    self.cancel_requested.insert(order_id);
                }
                Ok(Err(e)) => {
                    warn!(symbol = %self.symbol, order_id = %order_id, error = %e, "Stale order cancel failed");
                }
                Err(_) => {
                    warn!(symbol = %self.symbol, order_id = %order_id, "Stale order cancel timed out");
                }
            }
        }
    }

    /// Marks the position to `price` in the ledger.
    pub async fn mark(&self, price: Decimal) {
        if let Some(position) = self.position.as_ref().filter(|p| !p.quantity.is_zero()) {
            self.ctx.book.write().await.ledger.mark(position, price);
        }
    }

    /// Runs exit evaluation for an OPEN position. Trailing stop changes are
    /// persisted even when no exit triggers.
    pub async fn evaluate_exit(
        &mut self,
        price: Decimal,
        signal: Option<SignalExit<'_>>,
    ) -> Option<CloseReason> {
        let position = self.position.as_mut().filter(|p| p.state == PositionState::Open)?;
        let before = position.trailing.as_ref().and_then(|t| t.stop);
        let reason = evaluate_exit(position, price, signal);
        let after = position.trailing.as_ref().and_then(|t| t.stop);

        if before != after {
            debug!(symbol = %self.symbol, stop = ?after, "Trailing stop ratcheted");
            self.persist_position().await;
            self.sync_views().await;
        }
        reason
    }

    fn owns(&self, order: &Order) -> bool {
        let owned = self
            .position
            .as_ref()
            .is_some_and(|p| Some(p.id) == order.position_id);
        if !owned {
            warn!(
                symbol = %self.symbol,
                order_id = %order.id,
                "Order does not belong to the current position"
            );
        }
        owned
    }

    async fn revert_to_open(&mut self) {
        if let Some(position) = self.position.as_mut() {
            position.set_state(PositionState::Open);
            position.close_reason = None;
        }
        self.persist_position().await;
        self.sync_views().await;
    }

    /// Returns a reduced position to OPEN and shrinks its reservation to the
    /// remaining notional.
    async fn finish_reduce(&mut self, price: Option<Decimal>) {
        let Some(position) = self.position.as_mut() else {
            return;
        };
        position.set_state(PositionState::Open);
        position.close_reason = None;
        let reduced = position.clone();
        let price = price.unwrap_or(reduced.entry_price);
        {
            let mut book = self.ctx.book.write().await;
            book.ledger.reserve(&self.symbol, reduced.notional(price));
            book.ledger.mark(&reduced, price);
        }
        info!(
            symbol = %self.symbol,
            quantity = %reduced.quantity,
            price = %price,
            "Position reduced"
        );
    }

    /// Forgets the position. With `release` its exposure is freed too.
    async fn drop_position(&mut self, release: bool) -> Option<Position> {
        let position = self.position.take();
        if release {
            self.ctx.book.write().await.ledger.release(&self.symbol);
        }
        self.persist_position().await;
        self.sync_views().await;
        position
    }

    async fn halt_symbol(&self, reason: HaltReason, detail: String) {
        let state = {
            let mut book = self.ctx.book.write().await;
            book.halt
                .trip_symbol(&self.symbol, reason, detail.clone())
                .then(|| book.halt.state().clone())
        };
        let Some(state) = state else { return };

        self.ctx.bus.publish(EngineEvent::TradingHalted {
            symbol: Some(self.symbol.clone()),
            reason,
            detail,
        });
        if let Err(e) = self.ctx.store.save_halts(&state).await {
            self.persistence_failure(format!("save halts: {e}"));
        }
    }

    fn raise_incident(&self, incident: Incident, position: Option<Position>) {
        let incident = match position {
            Some(p) => incident.with_position(p),
            None => incident,
        };
        error!(
            symbol = %self.symbol,
            kind = ?incident.kind,
            detail = %incident.detail,
            "Incident raised"
        );
        self.ctx.bus.publish(EngineEvent::Incident(incident));
    }

    fn persistence_failure(&self, detail: String) {
        self.raise_incident(
            Incident::new(
                IncidentKind::PersistenceFailure,
                Some(self.symbol.clone()),
                detail,
            ),
            None,
        );
    }

    fn publish_transition(&self, order: &Order, from: OrderStatus, to: OrderStatus) {
        debug!(
            symbol = %self.symbol,
            order_id = %order.id,
            from = %from,
            to = %to,
            "Order state changed"
        );
        self.ctx.bus.publish(EngineEvent::OrderStateChanged {
            order_id: order.id,
            symbol: self.symbol.clone(),
            from,
            to,
        });
    }

    async fn persist_position(&self) {
        let result = match &self.position {
            Some(p) => self.ctx.store.upsert_position(p).await,
            None => self.ctx.store.remove_position(&self.symbol).await,
        };
        if let Err(e) = result {
            self.persistence_failure(format!("persist position: {e}"));
        }
    }

    async fn persist_order(&self, order: &Order) {
        let result = if order.is_terminal() {
            self.ctx.store.remove_order(order.id).await
        } else {
            self.ctx.store.upsert_order(order).await
        };
        if let Err(e) = result {
            self.persistence_failure(format!("persist order {}: {e}", order.id));
        }
    }

    async fn append_ledger(&self, entry: &LedgerEntry) {
        if let Err(e) = self.ctx.store.append_ledger_entry(entry).await {
            self.persistence_failure(format!("append ledger entry: {e}"));
        }
    }

    async fn sync_views(&self) {
        let orders: Vec<&Order> = self.orders.values().collect();
        self.ctx
            .views
            .publish(&self.symbol, self.position.as_ref(), &orders)
            .await;
    }
}

fn purpose_label(purpose: OrderPurpose) -> &'static str {
    match purpose {
        OrderPurpose::Open => "open",
        OrderPurpose::Close => "close",
        OrderPurpose::Reduce => "reduce",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Envelope, Topic};
    use crate::testing::{btc, fixture, open_request};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<Arc<Envelope>>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.event.clone());
        }
        out
    }

    fn fill(order_id: OrderId, quantity: Decimal, price: Decimal, fee: Decimal) -> ExchangeUpdate {
        ExchangeUpdate::new(
            order_id,
            btc(),
            ExchangeUpdateKind::Fill {
                quantity,
                price,
                fee,
            },
        )
    }

    fn only_order(lc: &SymbolLifecycle) -> OrderId {
        let ids: Vec<OrderId> = lc.working_orders().map(|o| o.id).collect();
        assert_eq!(ids.len(), 1, "expected a single working order");
        ids[0]
    }

    async fn opened(lc: &mut SymbolLifecycle, quantity: Decimal, price: Decimal) {
        lc.open(open_request(PositionSide::Long, quantity, price))
            .await
            .unwrap();
        let id = only_order(lc);
        lc.on_exchange_update(fill(id, quantity, price, Decimal::ZERO))
            .await;
        assert_eq!(lc.state(), Some(PositionState::Open));
    }

    #[tokio::test]
    async fn test_open_then_fills_reach_open() {
        let fx = fixture();
        let (_sub, mut rx) = fx.bus.subscribe_channel(Topic::Lifecycle);
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());

        lc.open(open_request(PositionSide::Long, dec!(2), dec!(100)))
            .await
            .unwrap();
        assert_eq!(lc.state(), Some(PositionState::Opening));
        let id = only_order(&lc);

        lc.on_exchange_update(fill(id, dec!(1), dec!(100), dec!(0.1))).await;
        assert_eq!(lc.state(), Some(PositionState::Opening));

        lc.on_exchange_update(fill(id, dec!(1), dec!(102), dec!(0.1))).await;
        let position = lc.position().unwrap();
        assert_eq!(position.state, PositionState::Open);
        assert_eq!(position.entry_price, dec!(101));
        assert_eq!(position.stop_loss, Some(dec!(98.98)));
        assert_eq!(lc.working_orders().count(), 0);

        assert_eq!(fx.book.read().await.ledger.balance(), dec!(9999.8));

        let persisted = fx.store.snapshot().await;
        assert_eq!(persisted.positions[&btc()].state, PositionState::Open);
        assert!(persisted.orders.is_empty());
        assert_eq!(persisted.ledger.len(), 2);

        let events = drain(&mut rx);
        let transitions: Vec<(OrderStatus, OrderStatus)> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::OrderStateChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (OrderStatus::Created, OrderStatus::Submitted),
                (OrderStatus::Submitted, OrderStatus::Acknowledged),
                (OrderStatus::Acknowledged, OrderStatus::PartiallyFilled),
                (OrderStatus::PartiallyFilled, OrderStatus::Filled),
            ]
        );
        assert!(matches!(events.last(), Some(EngineEvent::PositionOpened { .. })));
        assert!(fx.views.position(&btc()).await.is_some());
    }

    #[tokio::test]
    async fn test_open_timeouts_exhaust_to_none() {
        let fx = fixture();
        let (_sub, mut incidents) = fx.bus.subscribe_channel(Topic::Incident);
        fx.book.write().await.ledger.reserve(&btc(), dec!(200));
        for _ in 0..3 {
            fx.exchange
                .push(Err(ExchangeError::Timeout(Duration::from_millis(50))));
        }
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());

        let err = lc
            .open(open_request(PositionSide::Long, dec!(2), dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::RetriesExhausted { attempts: 3, .. }));

        assert_eq!(lc.state(), None);
        assert_eq!(fx.exchange.requests().len(), 3);
        assert_eq!(lc.working_orders().count(), 0);
        assert!(fx.views.orders().await.is_empty());
        let persisted = fx.store.snapshot().await;
        assert!(persisted.orders.is_empty());
        assert!(persisted.positions.is_empty());
        assert!(persisted.halts.symbols.contains_key(&btc()));

        let book = fx.book.read().await;
        assert_eq!(book.ledger.total_exposure(), Decimal::ZERO);
        assert!(!book.halt.is_symbol_allowed(&btc()));
        drop(book);

        let events = drain(&mut incidents);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Incident(i) if i.kind == IncidentKind::StuckOrder && i.position.is_some()
        )));
    }

    #[tokio::test]
    async fn test_hanging_exchange_is_bounded_by_timeout() {
        let fx = fixture();
        fx.exchange.hang();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());

        let started = std::time::Instant::now();
        let err = lc
            .open(open_request(PositionSide::Short, dec!(1), dec!(50)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RetriesExhausted {
                last: ExchangeError::Timeout(_),
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(lc.state(), None);
    }

    #[tokio::test]
    async fn test_open_rejected_rolls_back_without_retry() {
        let fx = fixture();
        let (_sub, mut incidents) = fx.bus.subscribe_channel(Topic::Incident);
        fx.book.write().await.ledger.reserve(&btc(), dec!(200));
        fx.exchange
            .push(Err(ExchangeError::Rejected("insufficient margin".into())));
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());

        let err = lc
            .open(open_request(PositionSide::Long, dec!(2), dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ExchangeRejected { .. }));
        assert_eq!(fx.exchange.requests().len(), 1);
        assert_eq!(lc.state(), None);

        let book = fx.book.read().await;
        assert_eq!(book.ledger.total_exposure(), Decimal::ZERO);
        assert!(book.halt.is_symbol_allowed(&btc()));
        drop(book);

        assert!(matches!(
            drain(&mut incidents).as_slice(),
            [EngineEvent::Incident(i)] if i.kind == IncidentKind::ExchangeRejected
        ));
    }

    #[tokio::test]
    async fn test_venue_reject_callback_rolls_back_open() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        lc.open(open_request(PositionSide::Long, dec!(1), dec!(100)))
            .await
            .unwrap();
        let id = only_order(&lc);

        lc.on_exchange_update(ExchangeUpdate::new(
            id,
            btc(),
            ExchangeUpdateKind::Rejected {
                reason: "price band".into(),
            },
        ))
        .await;

        assert_eq!(lc.state(), None);
        assert_eq!(lc.working_orders().count(), 0);
    }

    #[tokio::test]
    async fn test_close_realizes_pnl() {
        let fx = fixture();
        let (_sub, mut rx) = fx.bus.subscribe_channel(Topic::Lifecycle);
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        fx.book.write().await.ledger.reserve(&btc(), dec!(200));
        opened(&mut lc, dec!(2), dec!(100)).await;

        lc.close(CloseReason::TakeProfit).await.unwrap();
        assert_eq!(lc.state(), Some(PositionState::Closing));
        let requests = fx.exchange.requests();
        let close_request = requests.last().unwrap();
        assert!(close_request.reduce_only);
        assert_eq!(close_request.side, OrderSide::Sell);

        let id = only_order(&lc);
        lc.on_exchange_update(fill(id, dec!(2), dec!(104), Decimal::ZERO)).await;

        assert_eq!(lc.state(), None);
        let book = fx.book.read().await;
        assert_eq!(book.ledger.balance(), dec!(10008));
        assert_eq!(book.ledger.total_exposure(), Decimal::ZERO);
        drop(book);
        assert!(fx.store.snapshot().await.positions.is_empty());

        let closed = drain(&mut rx).into_iter().find_map(|e| match e {
            EngineEvent::PositionClosed {
                reason, exit_price, ..
            } => Some((reason, exit_price)),
            _ => None,
        });
        assert_eq!(closed, Some((Some(CloseReason::TakeProfit), dec!(104))));
    }

    #[tokio::test]
    async fn test_partial_close_keeps_remaining_quantity() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        opened(&mut lc, dec!(2), dec!(100)).await;

        lc.close(CloseReason::Manual).await.unwrap();
        let id = only_order(&lc);
        lc.on_exchange_update(fill(id, dec!(0.5), dec!(98), Decimal::ZERO)).await;

        let position = lc.position().unwrap();
        assert_eq!(position.state, PositionState::Closing);
        assert_eq!(position.quantity, dec!(1.5));
        assert_eq!(fx.book.read().await.ledger.balance(), dec!(9999));

        lc.on_exchange_update(ExchangeUpdate::new(
            id,
            btc(),
            ExchangeUpdateKind::Cancelled {
                reason: "expired".into(),
            },
        ))
        .await;
        assert_eq!(lc.state(), Some(PositionState::Open));
        assert_eq!(lc.position().unwrap().close_reason, None);
    }

    #[tokio::test]
    async fn test_close_rejected_returns_to_open() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        opened(&mut lc, dec!(1), dec!(100)).await;

        fx.exchange
            .push(Err(ExchangeError::Rejected("reduce-only conflict".into())));
        let err = lc.close(CloseReason::StopLoss).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ExchangeRejected { .. }));
        assert_eq!(lc.state(), Some(PositionState::Open));
        assert_eq!(lc.position().unwrap().close_reason, None);
    }

    #[tokio::test]
    async fn test_close_exhausted_halts_symbol_and_keeps_exposure() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        fx.book.write().await.ledger.reserve(&btc(), dec!(100));
        opened(&mut lc, dec!(1), dec!(100)).await;

        for _ in 0..3 {
            fx.exchange
                .push(Err(ExchangeError::Transport("connection reset".into())));
        }
        let err = lc.close(CloseReason::StopLoss).await.unwrap_err();
        assert!(matches!(err, LifecycleError::RetriesExhausted { .. }));

        assert_eq!(lc.state(), None);
        let book = fx.book.read().await;
        assert_eq!(book.ledger.total_exposure(), dec!(100));
        assert_eq!(
            book.halt.symbol_halt(&btc()).map(|r| r.reason),
            Some(HaltReason::StuckOrder)
        );
    }

    #[tokio::test]
    async fn test_partial_open_then_cancel_keeps_filled_quantity() {
        let fx = fixture();
        let (_sub, mut rx) = fx.bus.subscribe_channel(Topic::Lifecycle);
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        fx.book.write().await.ledger.reserve(&btc(), dec!(200));
        lc.open(open_request(PositionSide::Long, dec!(2), dec!(100)))
            .await
            .unwrap();
        let id = only_order(&lc);

        lc.on_exchange_update(fill(id, dec!(0.5), dec!(100), Decimal::ZERO)).await;
        lc.on_exchange_update(ExchangeUpdate::new(
            id,
            btc(),
            ExchangeUpdateKind::Cancelled {
                reason: "ttl".into(),
            },
        ))
        .await;

        let position = lc.position().unwrap();
        assert_eq!(position.state, PositionState::Open);
        assert_eq!(position.quantity, dec!(0.5));
        assert!(position.stop_loss.is_some());
        assert_eq!(fx.book.read().await.ledger.total_exposure(), dec!(50));
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, EngineEvent::PositionOpened { .. }))
        );
    }

    #[tokio::test]
    async fn test_unfilled_cancel_returns_to_none() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        fx.book.write().await.ledger.reserve(&btc(), dec!(200));
        lc.open(open_request(PositionSide::Short, dec!(2), dec!(100)))
            .await
            .unwrap();
        let id = only_order(&lc);

        lc.on_exchange_update(ExchangeUpdate::new(
            id,
            btc(),
            ExchangeUpdateKind::Cancelled {
                reason: "ttl".into(),
            },
        ))
        .await;

        assert_eq!(lc.state(), None);
        assert_eq!(fx.book.read().await.ledger.total_exposure(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_one_operation_in_flight_per_symbol() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        lc.open(open_request(PositionSide::Long, dec!(1), dec!(100)))
            .await
            .unwrap();

        let again = lc
            .open(open_request(PositionSide::Long, dec!(1), dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            LifecycleError::OperationInFlight {
                state: PositionState::Opening,
                ..
            }
        ));
        assert!(matches!(
            lc.close(CloseReason::Manual).await,
            Err(LifecycleError::OperationInFlight { .. })
        ));

        let id = only_order(&lc);
        lc.on_exchange_update(fill(id, dec!(1), dec!(100), Decimal::ZERO)).await;
        assert!(matches!(
            lc.open(open_request(PositionSide::Short, dec!(1), dec!(100))).await,
            Err(LifecycleError::AlreadyOpen(_))
        ));
        assert_eq!(fx.exchange.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_late_updates_are_ignored() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        opened(&mut lc, dec!(1), dec!(100)).await;
        let before = lc.position().cloned();

        lc.on_exchange_update(fill(OrderId::new(), dec!(1), dec!(90), Decimal::ZERO))
            .await;
        assert_eq!(lc.position().cloned(), before);
        assert_eq!(fx.book.read().await.ledger.balance(), dec!(10000));
    }

    #[tokio::test]
    async fn test_late_fill_of_timed_out_order_halts_symbol() {
        let fx = fixture();
        let (_sub, mut incidents) = fx.bus.subscribe_channel(Topic::Incident);
        fx.exchange
            .push(Err(ExchangeError::Timeout(Duration::from_millis(50))));
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());

        lc.open(open_request(PositionSide::Long, dec!(2), dec!(100)))
            .await
            .unwrap();
        let requests = fx.exchange.requests();
        assert_eq!(requests.len(), 2);
        let timed_out = requests[0].client_order_id;
        assert_eq!(fx.exchange.cancels(), vec![timed_out]);

        let accepted = only_order(&lc);
        assert_ne!(accepted, timed_out);
        lc.on_exchange_update(fill(accepted, dec!(2), dec!(100), Decimal::ZERO))
            .await;
        assert_eq!(lc.state(), Some(PositionState::Open));
        assert!(drain(&mut incidents).is_empty());

        lc.on_exchange_update(fill(timed_out, dec!(2), dec!(100), Decimal::ZERO))
            .await;

        assert_eq!(lc.position().unwrap().quantity, dec!(2));
        let events = drain(&mut incidents);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Incident(i)
                if i.kind == IncidentKind::ReconciliationMismatch
                    && i.order.as_ref().map(|o| o.id) == Some(timed_out)
        )));
        let book = fx.book.read().await;
        assert_eq!(
            book.halt.symbol_halt(&btc()).map(|r| r.reason),
            Some(HaltReason::ReconciliationMismatch)
        );
        assert_eq!(book.ledger.total_exposure(), dec!(400));
        drop(book);
        assert!(fx.store.snapshot().await.halts.symbols.contains_key(&btc()));
    }

    #[tokio::test]
    async fn test_confirmed_cancel_forgets_timed_out_order() {
        let fx = fixture();
        let (_sub, mut incidents) = fx.bus.subscribe_channel(Topic::Incident);
        fx.exchange
            .push(Err(ExchangeError::Timeout(Duration::from_millis(50))));
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        lc.open(open_request(PositionSide::Long, dec!(1), dec!(100)))
            .await
            .unwrap();
        let timed_out = fx.exchange.requests()[0].client_order_id;

        lc.on_exchange_update(ExchangeUpdate::new(
            timed_out,
            btc(),
            ExchangeUpdateKind::Cancelled {
                reason: "cancelled by client".into(),
            },
        ))
        .await;
        lc.on_exchange_update(fill(timed_out, dec!(1), dec!(100), Decimal::ZERO))
            .await;

        assert!(drain(&mut incidents).is_empty());
        assert!(fx.book.read().await.halt.is_symbol_allowed(&btc()));
        assert_eq!(lc.state(), Some(PositionState::Opening));
    }

    #[tokio::test]
    async fn test_reduce_keeps_remainder_open() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        fx.book.write().await.ledger.reserve(&btc(), dec!(200));
        opened(&mut lc, dec!(2), dec!(100)).await;

        lc.reduce(dec!(0.5)).await.unwrap();
        assert_eq!(lc.state(), Some(PositionState::Closing));
        assert_eq!(
            lc.position().unwrap().close_reason,
            Some(CloseReason::Emergency)
        );
        let requests = fx.exchange.requests();
        let reduce_request = requests.last().unwrap();
        assert!(reduce_request.reduce_only);
        assert_eq!(reduce_request.side, OrderSide::Sell);
        assert_eq!(reduce_request.quantity, dec!(1));

        let id = only_order(&lc);
        lc.on_exchange_update(fill(id, dec!(1), dec!(110), Decimal::ZERO)).await;

        let position = lc.position().unwrap();
        assert_eq!(position.state, PositionState::Open);
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(position.close_reason, None);
        assert!(position.stop_loss.is_some());
        let book = fx.book.read().await;
        assert_eq!(book.ledger.balance(), dec!(10010));
        assert_eq!(book.ledger.total_exposure(), dec!(110));
    }

    #[tokio::test]
    async fn test_reduce_rejects_bad_fraction_and_missing_position() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        assert!(matches!(
            lc.reduce(dec!(0.5)).await,
            Err(LifecycleError::NoPosition(_))
        ));

        opened(&mut lc, dec!(1), dec!(100)).await;
        for fraction in [dec!(0), dec!(1), dec!(1.5)] {
            assert!(matches!(
                lc.reduce(fraction).await,
                Err(LifecycleError::InvalidInput(_))
            ));
        }
        assert_eq!(lc.state(), Some(PositionState::Open));
        assert_eq!(fx.exchange.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_orders_cancelled_once() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        lc.open(open_request(PositionSide::Long, dec!(1), dec!(100)))
            .await
            .unwrap();
        let id = only_order(&lc);

        lc.expire_stale_orders(Utc::now()).await;
        assert!(fx.exchange.cancels().is_empty());

        let later = Utc::now() + chrono::Duration::minutes(5);
        lc.expire_stale_orders(later).await;
        lc.expire_stale_orders(later).await;
        assert_eq!(fx.exchange.cancels(), vec![id]);
    }

    #[tokio::test]
    async fn test_exit_evaluation_only_for_open_positions() {
        let fx = fixture();
        let mut lc = SymbolLifecycle::new(btc(), fx.ctx.clone());
        assert_eq!(lc.evaluate_exit(dec!(50), None).await, None);

        lc.open(open_request(PositionSide::Long, dec!(1), dec!(100)))
            .await
            .unwrap();
        assert_eq!(lc.evaluate_exit(dec!(50), None).await, None);

        let id = only_order(&lc);
        lc.on_exchange_update(fill(id, dec!(1), dec!(100), Decimal::ZERO)).await;
        assert_eq!(
            lc.evaluate_exit(dec!(97), None).await,
            Some(CloseReason::StopLoss)
        );
    }
}
