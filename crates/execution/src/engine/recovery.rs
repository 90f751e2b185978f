//! Startup reconciliation of persisted state against the venue.

use crate::error::ExchangeError;
use crate::ports::ExchangePosition;
use crate::risk::TradingHalt;
use ftrade_data::PersistedState;
use ftrade_domain::entities::HaltReason;
use ftrade_domain::enums::PositionState;
use ftrade_domain::value_objects::Symbol;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// A symbol whose local state could not be confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub symbol: Symbol,
    pub detail: String,
}

/// Outcome of comparing persisted positions with the venue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Symbols whose OPEN position agrees with the venue.
    pub restored: Vec<Symbol>,
    /// Symbols halted pending operator review.
    pub mismatches: Vec<Mismatch>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares `persisted` with the venue's view and halts every symbol that
/// does not agree. Local state is never overwritten.
pub fn reconcile(
    persisted: &PersistedState,
    venue: Result<Vec<ExchangePosition>, ExchangeError>,
    halt: &mut TradingHalt,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    let mut local: BTreeSet<Symbol> = persisted.positions.keys().cloned().collect();
    local.extend(
        persisted
            .orders
            .iter()
            .filter(|o| !o.is_terminal())
            .map(|o| o.symbol.clone()),
    );

    let venue = match venue {
        Ok(positions) => positions,
        Err(e) => {
            warn!(error = %e, symbols = local.len(), "Venue positions unavailable at startup");
            for symbol in local {
                report.mismatches.push(Mismatch {
                    symbol,
                    detail: format!("venue positions unavailable: {e}"),
                });
            }
            return finish(report, halt);
        }
    };
    let mut venue: BTreeMap<Symbol, ExchangePosition> = venue
        .into_iter()
        .filter(|p| !p.quantity.is_zero())
        .map(|p| (p.symbol.clone(), p))
        .collect();

    for symbol in local {
        let held = venue.remove(&symbol);
        let detail = match (persisted.positions.get(&symbol), held) {
            (Some(position), _) if position.state != PositionState::Open => Some(format!(
                "position {} was {:?} at shutdown",
                position.id, position.state
            )),
            (Some(position), Some(held)) => {
                if held.side == position.side && held.quantity == position.quantity {
                    None
                } else {
                    Some(format!(
                        "local {:?} {} vs venue {:?} {}",
                        position.side, position.quantity, held.side, held.quantity
                    ))
                }
            }
            (Some(position), None) => Some(format!(
                "local {:?} {} not held at venue",
                position.side, position.quantity
            )),
            (None, Some(held)) => Some(format!(
                "working orders without a local position, venue holds {:?} {}",
                held.side, held.quantity
            )),
            (None, None) => Some("working orders without a local position".to_string()),
        };
        match detail {
            None => report.restored.push(symbol),
            Some(detail) => report.mismatches.push(Mismatch { symbol, detail }),
        }
    }

    for (symbol, held) in venue {
        report.mismatches.push(Mismatch {
            detail: format!("venue-only position {:?} {}", held.side, held.quantity),
            symbol,
        });
    }

    finish(report, halt)
}

fn finish(report: RecoveryReport, halt: &mut TradingHalt) -> RecoveryReport {
    for mismatch in &report.mismatches {
        halt.trip_symbol(
            &mismatch.symbol,
            HaltReason::ReconciliationMismatch,
            mismatch.detail.clone(),
        );
    }
    info!(
        restored = report.restored.len(),
        mismatches = report.mismatches.len(),
        "Startup reconciliation finished"
    );
    report
}
