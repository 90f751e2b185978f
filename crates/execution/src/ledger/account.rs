use super::PortfolioLedger;
use crate::risk::{
    Assessment, Proposal, RiskAlert, RiskAlerts, RiskGate, RiskMetrics, RiskSnapshot, TradingHalt,
};
use ftrade_domain::entities::HaltReason;
use ftrade_domain::value_objects::Symbol;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Account state shared by every symbol worker: the ledger, the halt
/// latch and the raised risk alerts. Risk reads take the read lock;
/// admission, fills and halts take the write lock.
#[derive(Debug)]
pub struct AccountBook {
    pub ledger: PortfolioLedger,
    pub halt: TradingHalt,
    pub alerts: RiskAlerts,
}

pub type SharedBook = Arc<RwLock<AccountBook>>;

/// Result of admitting a proposal.
#[derive(Debug, Clone)]
pub struct Admission {
    pub assessment: Assessment,
    /// The assessment latched a new account halt.
    pub newly_halted: bool,
}

impl AccountBook {
    pub fn new(ledger: PortfolioLedger, halt: TradingHalt) -> Self {
        Self {
            ledger,
            halt,
            alerts: RiskAlerts::new(),
        }
    }

    pub fn shared(self) -> SharedBook {
        Arc::new(RwLock::new(self))
    }

    /// Consistent read of account state, scoped to `symbol` for halt checks.
    pub fn risk_snapshot(&self, symbol: Option<&Symbol>) -> RiskSnapshot {
        RiskSnapshot {
            equity: self.ledger.equity(),
            exposure: self.ledger.total_exposure(),
            day_start_equity: self.ledger.day_start_equity(),
            high_water_mark: self.ledger.high_water_mark(),
            at_risk: self.ledger.total_at_risk(),
            account_halt: self.halt.account_halt().map(|r| r.reason),
            symbol_halt: symbol.and_then(|s| self.halt.symbol_halt(s)).map(|r| r.reason),
        }
    }

    /// Assesses `proposal` and, in the same critical section, latches any
    /// halt it raised and reserves the approved notional.
    pub fn admit(&mut self, gate: &RiskGate, proposal: &Proposal) -> Admission {
        let snapshot = self.risk_snapshot(Some(&proposal.symbol));
        let assessment = gate.assess(proposal, &snapshot);

        let newly_halted = match &assessment.halt {
            Some((reason, detail)) => self.halt.trip(*reason, detail.clone()),
            None => false,
        };
        if assessment.decision.is_approved() {
            self.ledger
                .reserve(&proposal.symbol, assessment.decision.approved_size);
        }

        Admission {
            assessment,
            newly_halted,
        }
    }

    /// Runs the account limit check and latches a breach. Returns the
    /// reason and detail when a halt was newly set.
    pub fn enforce_limits(&mut self, gate: &RiskGate) -> Option<(HaltReason, String)> {
        let snapshot = self.risk_snapshot(None);
        let (reason, detail) = gate.check_limits(&snapshot)?;
        self.halt
            .trip(reason, detail.clone())
            .then_some((reason, detail))
    }

    /// Evaluates the warning thresholds. Returns only alerts not already
    /// raised, so every worker ticking the same account reports each once.
    pub fn check_alerts(&mut self, gate: &RiskGate) -> Vec<RiskAlert> {
        let metrics = self.metrics(gate);
        self.alerts.evaluate(&gate.config().alerts, &metrics)
    }

    pub fn metrics(&self, gate: &RiskGate) -> RiskMetrics {
        gate.metrics(&self.risk_snapshot(None))
    }
}
