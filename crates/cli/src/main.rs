//! Command Line Interface for the futures trading engine.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ftrade_data::{FileStateStore, PgStateStore, StateStore};
use ftrade_domain::enums::PositionState;
use ftrade_domain::value_objects::Symbol;
use ftrade_execution::prelude::*;
use ftrade_simulation::prelude::*;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod output;

#[derive(Parser)]
#[command(name = "ftrade")]
#[command(about = "Risk-gated futures trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine in paper mode against simulated market data
    Run {
        /// Engine config (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State file shared across runs (ignored when DATABASE_URL is set)
        #[arg(short, long, default_value = "ftrade-state.json")]
        state: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        duration_secs: Option<u64>,

        /// Starting price of every simulated market
        #[arg(long, default_value_t = 100.0)]
        initial_price: f64,

        /// Annualized volatility of the simulated markets
        #[arg(long, default_value_t = 0.8)]
        volatility: f64,

        /// Seed for prices and signals
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Print persisted positions, orders, balance and halts
    Status {
        /// State file
        #[arg(short, long, default_value = "ftrade-state.json")]
        state: PathBuf,
    },
    /// Clear the account halt, or one symbol's halt
    ResetHalt {
        /// State file
        #[arg(short, long, default_value = "ftrade-state.json")]
        state: PathBuf,

        /// Symbol whose halt to clear
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            state,
            duration_secs,
            initial_price,
            volatility,
            seed,
        } => {
            let mut engine_config = match &config {
                Some(path) => EngineConfig::from_file(path)?,
                None => EngineConfig::default(),
            };
            engine_config.apply_env_overrides()?;
            let initial_price =
                Decimal::from_f64(initial_price).context("initial price is not a number")?;
            run_paper(engine_config, &state, duration_secs, initial_price, volatility, seed).await
        }
        Commands::Status { state } => {
            let persisted = open_store(&state)
                .await?
                .load()
                .await
                .context("failed to load state")?;
            output::print_state(&persisted);
            Ok(())
        }
        Commands::ResetHalt { state, symbol } => reset_halt(&state, symbol.as_deref()).await,
    }
}

async fn run_paper(
    config: EngineConfig,
    state: &Path,
    duration_secs: Option<u64>,
    initial_price: Decimal,
    volatility: f64,
    seed: u64,
) -> Result<()> {
    let store = open_store(state).await?;
    let persisted = store.load().await.context("failed to load state")?;

    println!("📈 Starting {} simulated markets...", config.symbols.len());
    let feed = Arc::new(SimulatedFeed::default());
    for (i, symbol) in config.symbols.iter().enumerate() {
        feed.add_gbm(symbol.symbol.clone(), initial_price, volatility, seed + i as u64)
            .await;
    }
    let (exchange, updates) = PaperExchange::new(PaperConfig::default(), feed.clone());

    // The paper venue resumes holding whatever the last run left open.
    for position in persisted.positions.values() {
        if position.state == PositionState::Open {
            exchange
                .seed_position(&ExchangePosition {
                    symbol: position.symbol.clone(),
                    side: position.side,
                    quantity: position.quantity,
                    entry_price: position.entry_price,
                })
                .await;
        }
    }

    let bus = EventBus::new();
    let mut subscriptions = Vec::new();
    for topic in [Topic::Lifecycle, Topic::Risk, Topic::Incident] {
        subscriptions.push(bus.subscribe(
            topic,
            handler_fn(|envelope: &Envelope| {
                output::print_event(&envelope.event);
                Ok(())
            }),
        ));
    }

    let engine = EngineBuilder::new(config)
        .with_snapshot_provider(feed)
        .with_signal_source(Arc::new(RandomSignalSource::new(seed)))
        .with_exchange(exchange, updates)
        .with_store(store)
        .with_bus(bus)
        .start()
        .await?;

    let recovery = engine.recovery();
    if !recovery.is_clean() {
        println!("⚠️  {} symbols halted by reconciliation", recovery.mismatches.len());
    }
    println!("✅ Engine running on {:?}. Press Ctrl-C to stop.", engine.symbols());

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutting down");
    let stats = engine.trade_stats().await;
    let ledger = engine.ledger().await;
    let metrics = engine.risk_metrics().await;
    let report = engine.shutdown().await;
    for subscription in subscriptions {
        subscription.cancel();
    }

    output::print_summary(&stats, &ledger, &metrics, &report);
    Ok(())
}

/// PostgreSQL when `DATABASE_URL` is set, the JSON state file otherwise.
async fn open_store(state: &Path) -> Result<Arc<dyn StateStore>> {
    match env::var("DATABASE_URL") {
        Ok(url) => {
            info!("Using PostgreSQL state store");
            let store = PgStateStore::connect(&url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            Ok(Arc::new(store))
        }
        Err(_) => {
            info!(path = %state.display(), "Using file state store");
            Ok(Arc::new(FileStateStore::new(state)))
        }
    }
}

async fn reset_halt(state: &Path, symbol: Option<&str>) -> Result<()> {
    let store = open_store(state).await?;
    let persisted = store.load().await.context("failed to load state")?;
    let mut halts = persisted.halts;

    let cleared = match symbol {
        Some(raw) => {
            let symbol = Symbol::new(raw).map_err(|e| anyhow::anyhow!("{e}"))?;
            halts.symbols.remove(&symbol)
        }
        None => halts.account.take(),
    };
    match cleared {
        Some(record) => {
            store.save_halts(&halts).await?;
            println!("✅ Cleared halt: {} ({})", record.reason, record.detail);
        }
        None => println!("Nothing to reset."),
    }
    Ok(())
}
