//! Trade journal built from lifecycle events.

use crate::bus::{EngineEvent, Envelope, EventHandler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ftrade_domain::entities::{Position, PositionId};
use ftrade_domain::enums::{CloseReason, PositionSide};
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// One position from open to close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub side: PositionSide,
    pub strategy: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    /// Quantity held once the entry completed.
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    /// Net PnL over entry notional.
    pub net_pnl_pct: Decimal,
    pub close_reason: Option<CloseReason>,
    pub is_open: bool,
}

impl TradeSummary {
    fn opened(position: &Position) -> Self {
        Self {
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            strategy: position.strategy.clone(),
            opened_at: position.opened_at,
            closed_at: None,
            entry_price: position.entry_price,
            exit_price: None,
            quantity: position.quantity,
            realized_pnl: Decimal::ZERO,
            fees: position.fees,
            net_pnl_pct: Decimal::ZERO,
            close_reason: None,
            is_open: true,
        }
    }

    pub fn net_pnl(&self) -> Decimal {
        self.realized_pnl - self.fees
    }
}

/// Aggregate statistics across all journaled trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_trades: u32,
    pub open_trades: u32,
    pub closed_trades: u32,
    pub wins: u32,
    pub losses: u32,
    /// Wins over closed trades.
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub total_fees: Decimal,
    /// Mean net PnL percentage of closed trades.
    pub avg_pnl_pct: Decimal,
    pub order_transitions: u64,
}

/// Lifecycle subscriber keeping a summary per position.
#[derive(Clone, Default)]
pub struct TradeJournal {
    summaries: Arc<RwLock<HashMap<PositionId, TradeSummary>>>,
    order_transitions: Arc<AtomicU64>,
}

impl TradeJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_opened(&self, position: &Position) {
        self.summaries
            .write()
            .await
            .insert(position.id, TradeSummary::opened(position));
        debug!(symbol = %position.symbol, position_id = %position.id, "Trade journaled");
    }

    pub async fn record_closed(
        &self,
        position: &Position,
        reason: Option<CloseReason>,
        exit_price: Decimal,
    ) {
        let mut summaries = self.summaries.write().await;
        let summary = summaries
            .entry(position.id)
            .or_insert_with(|| TradeSummary::opened(position));

        summary.closed_at = Some(position.updated_at);
        summary.exit_price = Some(exit_price);
        summary.realized_pnl = position.realized_pnl;
        summary.fees = position.fees;
        summary.close_reason = reason;
        summary.is_open = false;

        let entry_notional = summary.entry_price * summary.quantity;
        if !entry_notional.is_zero() {
            summary.net_pnl_pct = summary.net_pnl() / entry_notional * Decimal::ONE_HUNDRED;
        }
        debug!(
            symbol = %position.symbol,
            position_id = %position.id,
            net_pnl = %summary.net_pnl(),
            "Trade closed in journal"
        );
    }

    pub async fn get_summary(&self, position: &PositionId) -> Option<TradeSummary> {
        self.summaries.read().await.get(position).cloned()
    }

    /// All trades, oldest first.
    pub async fn get_all_summaries(&self) -> Vec<TradeSummary> {
        let mut all: Vec<TradeSummary> = self.summaries.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.opened_at);
        all
    }

    pub async fn get_closed_trades(&self) -> Vec<TradeSummary> {
        self.get_all_summaries()
            .await
            .into_iter()
            .filter(|s| !s.is_open)
            .collect()
    }

    pub async fn get_aggregate_stats(&self) -> AggregateStats {
        let summaries = self.summaries.read().await;
        let mut stats = AggregateStats {
            order_transitions: self.order_transitions.load(Ordering::Relaxed),
            ..Default::default()
        };
        let mut pct_sum = Decimal::ZERO;

        for summary in summaries.values() {
            stats.total_trades += 1;
            stats.total_fees += summary.fees;
            if summary.is_open {
                stats.open_trades += 1;
                continue;
            }
            stats.closed_trades += 1;
            stats.total_pnl += summary.net_pnl();
            pct_sum += summary.net_pnl_pct;
            if summary.net_pnl() > Decimal::ZERO {
                stats.wins += 1;
            } else {
                stats.losses += 1;
            }
        }

        if stats.closed_trades > 0 {
            let closed = Decimal::from(stats.closed_trades);
            stats.win_rate = Decimal::from(stats.wins) / closed;
            stats.avg_pnl_pct = pct_sum / closed;
        }
        stats
    }
}

#[async_trait]
impl EventHandler for TradeJournal {
    async fn handle(&self, event: Arc<Envelope>) -> anyhow::Result<()> {
        match &event.event {
            EngineEvent::PositionOpened { position } => self.record_opened(position).await,
            EngineEvent::PositionClosed {
                position,
                reason,
                exit_price,
            } => self.record_closed(position, *reason, *exit_price).await,
            EngineEvent::OrderStateChanged { .. } => {
                self.order_transitions.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        Ok(())
    }
}
