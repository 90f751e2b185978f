//! Terminal rendering for engine events and persisted state.
use ftrade_data::PersistedState;
use ftrade_execution::prelude::*;
use prettytable::{Table, row};

pub fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::PositionOpened { position } => println!(
            "🟢 Opened {} {:?} qty {} @ {}",
            position.symbol, position.side, position.quantity, position.entry_price
        ),
        EngineEvent::PositionClosed {
            position,
            reason,
            exit_price,
        } => println!(
            "🔴 Closed {} @ {} pnl {} ({})",
            position.symbol,
            exit_price,
            position.realized_pnl - position.fees,
            reason.as_ref().map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
        ),
        EngineEvent::OrderStateChanged {
            order_id,
            symbol,
            from,
            to,
        } => println!("   {symbol} order {order_id}: {from} -> {to}"),
        EngineEvent::RiskAssessed { symbol, decision } => {
            if decision.verdict != Verdict::Approve {
                println!(
                    "🛡️  {symbol} {:?} {} {}",
                    decision.verdict, decision.reason, decision.detail
                );
            }
        }
        EngineEvent::TradingHalted {
            symbol,
            reason,
            detail,
        } => println!(
            "⛔ Halted {}: {reason} ({detail})",
            symbol.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "account".to_string())
        ),
        EngineEvent::RiskAlert(alert) => println!(
            "⚠️  {:?} {}: {} (threshold {})",
            alert.level, alert.kind, alert.message, alert.threshold
        ),
        EngineEvent::HaltReset { symbol } => println!(
            "✅ Halt cleared for {}",
            symbol.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "account".to_string())
        ),
        EngineEvent::Incident(incident) => println!(
            "🚨 {:?} {}: {}",
            incident.kind,
            incident.symbol.as_ref().map(|s| s.to_string()).unwrap_or_default(),
            incident.detail
        ),
        EngineEvent::SignalGenerated { .. } => {}
    }
}

pub fn print_summary(
    stats: &AggregateStats,
    ledger: &LedgerSnapshot,
    metrics: &RiskMetrics,
    report: &ShutdownReport,
) {
    println!("\n📊 Session Summary");
    let mut table = Table::new();
    table.add_row(row!["Metric", "Value"]);
    table.add_row(row!["Trades", stats.total_trades]);
    table.add_row(row!["Closed", stats.closed_trades]);
    table.add_row(row!["Win rate", format!("{}%", (stats.win_rate * rust_decimal::Decimal::from(100)).round_dp(1))]);
    table.add_row(row!["Net PnL", stats.total_pnl.round_dp(4)]);
    table.add_row(row!["Fees", stats.total_fees.round_dp(4)]);
    table.add_row(row!["Balance", ledger.balance.round_dp(4)]);
    table.add_row(row!["Equity", ledger.equity.round_dp(4)]);
    table.add_row(row!["Exposure", ledger.exposure.round_dp(4)]);
    table.add_row(row!["Drawdown %", metrics.drawdown_pct.round_dp(2)]);
    table.add_row(row!["Risk score", metrics.risk_score]);
    table.add_row(row!["Workers stopped", report.workers_stopped]);
    table.printstd();

    if !report.open_positions.is_empty() {
        println!("\n⚠️  Positions left open (restored on next run):");
        let mut table = Table::new();
        table.add_row(row!["Symbol", "Side", "Qty", "Entry"]);
        for p in &report.open_positions {
            table.add_row(row![p.symbol, format!("{:?}", p.side), p.quantity, p.entry_price]);
        }
        table.printstd();
    }
    if !report.failed_workers.is_empty() {
        println!("❌ Workers that panicked: {:?}", report.failed_workers);
    }
}

pub fn print_state(state: &PersistedState) {
    if state.is_empty() {
        println!("No persisted state.");
        return;
    }

    println!("💰 Balance: {}", state.balance().map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()));

    println!("\n📌 Positions");
    let mut table = Table::new();
    table.add_row(row!["Symbol", "State", "Side", "Qty", "Entry", "Stop", "Target", "Strategy"]);
    for p in state.positions.values() {
        table.add_row(row![
            p.symbol,
            format!("{:?}", p.state),
            format!("{:?}", p.side),
            p.quantity,
            p.entry_price,
            p.stop_loss.map(|v| v.to_string()).unwrap_or_default(),
            p.take_profit.map(|v| v.to_string()).unwrap_or_default(),
            p.strategy
        ]);
    }
    table.printstd();

    if !state.orders.is_empty() {
        println!("\n📝 Working orders");
        let mut table = Table::new();
        table.add_row(row!["ID", "Symbol", "Side", "Purpose", "Qty", "Filled", "Status"]);
        for o in &state.orders {
            table.add_row(row![
                o.id,
                o.symbol,
                format!("{:?}", o.side),
                format!("{:?}", o.purpose),
                o.requested_quantity,
                o.filled_quantity,
                o.status
            ]);
        }
        table.printstd();
    }

    let halts = &state.halts;
    if halts.is_clear() {
        println!("\n✅ No halts");
        return;
    }
    println!("\n⛔ Halts");
    let mut table = Table::new();
    table.add_row(row!["Scope", "Reason", "Detail", "Since"]);
    if let Some(record) = &halts.account {
        table.add_row(row!["account", record.reason, record.detail, record.since.to_rfc3339()]);
    }
    for (symbol, record) in &halts.symbols {
        table.add_row(row![symbol, record.reason, record.detail, record.since.to_rfc3339()]);
    }
    table.printstd();
}
