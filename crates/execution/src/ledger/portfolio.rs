use chrono::{DateTime, NaiveDate, Utc};
use ftrade_domain::entities::{LedgerEntry, LedgerEntryKind, Position};
use ftrade_domain::value_objects::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exposure held by one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolExposure {
    /// Notional reserved at admission.
    pub reserved: Decimal,
    /// Open quantity times the last mark.
    pub notional: Decimal,
    pub unrealized: Decimal,
    /// Quantity times distance to the stop-loss.
    pub at_risk: Decimal,
}

impl SymbolExposure {
    /// Counts the larger of the reservation and the marked notional.
    pub fn exposure(&self) -> Decimal {
        self.reserved.max(self.notional)
    }
}

/// Read-only view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balance: Decimal,
    pub equity: Decimal,
    pub unrealized_pnl: Decimal,
    pub exposure: Decimal,
    pub day_start_equity: Decimal,
    pub high_water_mark: Decimal,
    pub exposures: BTreeMap<Symbol, SymbolExposure>,
    pub entries: Vec<LedgerEntry>,
}

/// Balances, realized and unrealized PnL, and exposure per symbol.
///
/// Entries are append-only; the balance is always the `balance_after` of
/// the last entry.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    balance: Decimal,
    entries: Vec<LedgerEntry>,
    exposures: BTreeMap<Symbol, SymbolExposure>,
    day: NaiveDate,
    day_start_equity: Decimal,
    high_water_mark: Decimal,
}

impl PortfolioLedger {
    /// New ledger funded with `initial_balance`.
    pub fn new(initial_balance: Decimal, now: DateTime<Utc>) -> Self {
        let deposit = LedgerEntry::new(
            LedgerEntryKind::Deposit,
            None,
            initial_balance,
            initial_balance,
        );
        Self {
            balance: initial_balance,
            entries: vec![deposit],
            exposures: BTreeMap::new(),
            day: now.date_naive(),
            day_start_equity: initial_balance,
            high_water_mark: initial_balance,
        }
    }

    /// Rebuilds the ledger from persisted entries. The day baseline is the
    /// balance at the end of the previous UTC day.
    pub fn restore(entries: Vec<LedgerEntry>, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let balance = entries.last().map_or(Decimal::ZERO, |e| e.balance_after);
        let high_water_mark = entries
            .iter()
            .map(|e| e.balance_after)
            .max()
            .unwrap_or(balance);
        let day_start_equity = entries
            .iter()
            .rev()
            .find(|e| e.timestamp.date_naive() < today)
            .map_or_else(
                || entries.first().map_or(balance, |e| e.balance_after),
                |e| e.balance_after,
            );

        Self {
            balance,
            entries,
            exposures: BTreeMap::new(),
            day: today,
            day_start_equity,
            high_water_mark,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.exposures.values().map(|e| e.unrealized).sum()
    }

    /// Balance plus unrealized PnL.
    pub fn equity(&self) -> Decimal {
        self.balance + self.unrealized_pnl()
    }

    pub fn total_exposure(&self) -> Decimal {
        self.exposures.values().map(SymbolExposure::exposure).sum()
    }

    pub fn total_at_risk(&self) -> Decimal {
        self.exposures.values().map(|e| e.at_risk).sum()
    }

    pub fn exposure(&self, symbol: &Symbol) -> Option<&SymbolExposure> {
        self.exposures.get(symbol)
    }

    pub fn day_start_equity(&self) -> Decimal {
        self.day_start_equity
    }

    pub fn high_water_mark(&self) -> Decimal {
        self.high_water_mark
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Moves the daily baseline at UTC midnight. Returns `true` on rollover.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today <= self.day {
            return false;
        }
        self.day = today;
        self.day_start_equity = self.equity();
        true
    }

    /// Holds exposure budget for an approved entry.
    pub fn reserve(&mut self, symbol: &Symbol, notional: Decimal) {
        self.exposures.entry(symbol.clone()).or_default().reserved = notional;
    }

    /// Drops all exposure tracked for `symbol`.
    pub fn release(&mut self, symbol: &Symbol) -> Option<SymbolExposure> {
        self.exposures.remove(symbol)
    }

    /// Marks an open position to `price`.
    pub fn mark(&mut self, position: &Position, price: Decimal) {
        let at_risk = position
            .stop_loss
            .map_or(Decimal::ZERO, |stop| position.quantity * (position.entry_price - stop).abs());
        let slot = self.exposures.entry(position.symbol.clone()).or_default();
        slot.notional = position.notional(price);
        slot.unrealized = position.unrealized_pnl(price);
        slot.at_risk = at_risk;
        self.bump_high_water_mark();
    }

    /// Books realized PnL and returns the entry to persist.
    pub fn record_realized(&mut self, symbol: &Symbol, pnl: Decimal) -> LedgerEntry {
        self.append(LedgerEntryKind::RealizedPnl, Some(symbol.clone()), pnl)
    }

    /// Debits a trading fee and returns the entry to persist.
    pub fn record_fee(&mut self, symbol: &Symbol, fee: Decimal) -> LedgerEntry {
        self.append(LedgerEntryKind::Fee, Some(symbol.clone()), -fee.abs())
    }

    fn append(&mut self, kind: LedgerEntryKind, symbol: Option<Symbol>, amount: Decimal) -> LedgerEntry {
        self.balance += amount;
        let entry = LedgerEntry::new(kind, symbol, amount, self.balance);
        self.entries.push(entry.clone());
        self.bump_high_water_mark();
        entry
    }

    fn bump_high_water_mark(&mut self) {
        self.high_water_mark = self.high_water_mark.max(self.equity());
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            balance: self.balance,
            equity: self.equity(),
            unrealized_pnl: self.unrealized_pnl(),
            exposure: self.total_exposure(),
            day_start_equity: self.day_start_equity,
            high_water_mark: self.high_water_mark,
            exposures: self.exposures.clone(),
            entries: self.entries.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ftrade_domain::entities::ExitLevels;
    use ftrade_domain::enums::PositionSide;
    use ftrade_domain::value_objects::Percentage;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT").unwrap()
    }

    fn open_long(qty: Decimal, price: Decimal) -> Position {
        let mut p = Position::opening(btc(), PositionSide::Long, "momentum", price, qty, dec!(0.8));
        p.apply_entry_fill(qty, price);
        p.arm_exits(&ExitLevels {
            stop_loss_pct: Percentage::new(dec!(0.02)),
            take_profit_pct: Percentage::new(dec!(0.04)),
            trailing_distance_pct: Percentage::new(dec!(0.015)),
            trailing_activation_pct: Percentage::new(dec!(0.01)),
        });
        p
    }

    #[test]
    fn test_new_ledger_records_deposit() {
        let ledger = PortfolioLedger::new(dec!(10000), Utc::now());
        assert_eq!(ledger.balance(), dec!(10000));
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.entries()[0].kind, LedgerEntryKind::Deposit);
    }

    #[test]
    fn test_mark_tracks_unrealized_and_exposure() {
        let mut ledger = PortfolioLedger::new(dec!(10000), Utc::now());
        let p = open_long(dec!(2), dec!(100));
        ledger.reserve(&btc(), dec!(200));
        ledger.mark(&p, dec!(90));

        assert_eq!(ledger.unrealized_pnl(), dec!(-20));
        assert_eq!(ledger.equity(), dec!(9980));
        // Reservation dominates while the mark is below it.
        assert_eq!(ledger.total_exposure(), dec!(200));
        assert_eq!(ledger.total_at_risk(), dec!(4));

        ledger.mark(&p, dec!(110));
        assert_eq!(ledger.total_exposure(), dec!(220));
        assert_eq!(ledger.high_water_mark(), dec!(10020));
    }

    #[test]
    fn test_realized_and_fees_append_entries() {
        let mut ledger = PortfolioLedger::new(dec!(1000), Utc::now());
        let e = ledger.record_realized(&btc(), dec!(50));
        assert_eq!(e.balance_after, dec!(1050));
        let f = ledger.record_fee(&btc(), dec!(0.5));
        assert_eq!(f.amount, dec!(-0.5));
        assert_eq!(ledger.balance(), dec!(1049.5));
        assert_eq!(ledger.entries().len(), 3);

        ledger.release(&btc());
        assert_eq!(ledger.total_exposure(), Decimal::ZERO);
    }

    #[test]
    fn test_day_roll_resets_baseline() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap();
        let mut ledger = PortfolioLedger::new(dec!(1000), start);
        ledger.record_realized(&btc(), dec!(-40));

        assert!(!ledger.roll_day(start + Duration::minutes(30)));
        assert_eq!(ledger.day_start_equity(), dec!(1000));

        assert!(ledger.roll_day(start + Duration::hours(2)));
        assert_eq!(ledger.day_start_equity(), dec!(960));
    }

    #[test]
    fn test_restore_rebuilds_balance_and_peak() {
        let mut ledger = PortfolioLedger::new(dec!(1000), Utc::now());
        ledger.record_realized(&btc(), dec!(100));
        ledger.record_realized(&btc(), dec!(-30));

        let restored = PortfolioLedger::restore(ledger.entries().to_vec(), Utc::now());
        assert_eq!(restored.balance(), dec!(1070));
        assert_eq!(restored.high_water_mark(), dec!(1100));
        // Every entry is from today, so the baseline is the opening deposit.
        assert_eq!(restored.day_start_equity(), dec!(1000));
    }
}
