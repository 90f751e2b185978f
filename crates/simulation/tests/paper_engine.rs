//! End-to-end runs of the engine against the paper collaborators.

use ftrade_data::{FileStateStore, MemoryStateStore, StateStore};
use ftrade_domain::entities::HaltReason;
use ftrade_domain::enums::{CloseReason, Direction, PositionState, Timeframe};
use ftrade_domain::value_objects::{Percentage, Symbol};
use ftrade_execution::prelude::*;
use ftrade_simulation::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

fn config(symbols: &[&str], tick_interval_secs: u64) -> EngineConfig {
    EngineConfig {
        tick_interval_secs,
        symbols: symbols
            .iter()
            .map(|s| SymbolConfig {
                symbol: sym(s),
                strategy: "model".to_string(),
                timeframe: Timeframe::M15,
            })
            .collect(),
        strategies: vec![StrategyConfig::new("model", StrategyKind::AiDriven)],
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
        timeouts: TimeoutConfig {
            snapshot_ms: 200,
            signal_ms: 200,
            exchange_ms: 50,
        },
        ..Default::default()
    }
}

struct Paper {
    feed: Arc<SimulatedFeed>,
    exchange: Arc<PaperExchange>,
    signals: Arc<FixedSignalSource>,
    bus: EventBus,
}

impl Paper {
    async fn new(paths: &[(&str, Vec<Decimal>)]) -> (Self, tokio::sync::mpsc::Receiver<ExchangeUpdate>) {
        let feed = Arc::new(SimulatedFeed::new(40));
        for (symbol, prices) in paths {
            feed.add_symbol(sym(symbol), DeterministicPricePath::new(prices.clone()))
                .await;
        }
        let config = PaperConfig {
            fill_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let (exchange, updates) = PaperExchange::new(config, feed.clone());
        let paper = Self {
            feed,
            exchange,
            signals: Arc::new(FixedSignalSource::new(Direction::Long, dec!(0.85))),
            bus: EventBus::new(),
        };
        (paper, updates)
    }

    fn builder(
        &self,
        config: EngineConfig,
        updates: tokio::sync::mpsc::Receiver<ExchangeUpdate>,
    ) -> EngineBuilder {
        EngineBuilder::new(config)
            .with_snapshot_provider(self.feed.clone())
            .with_signal_source(self.signals.clone())
            .with_exchange(self.exchange.clone(), updates)
            .with_bus(self.bus.clone())
    }
}

async fn eventually<F, Fut>(what: &str, timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn drain(rx: &mut UnboundedReceiver<Arc<Envelope>>, into: &mut Vec<EngineEvent>) {
    while let Ok(envelope) = rx.try_recv() {
        into.push(envelope.event.clone());
    }
}

fn decisions(events: &[EngineEvent]) -> Vec<(Symbol, RiskDecision)> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::RiskAssessed { symbol, decision } => Some((symbol.clone(), decision.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_entry_is_capped_at_two_percent_of_equity() {
    let (paper, updates) = Paper::new(&[("BTCUSDT", vec![dec!(100)])]).await;
    let (_sub, mut risk) = paper.bus.subscribe_channel(Topic::Risk);
    let engine = paper
        .builder(config(&["BTCUSDT"], 30), updates)
        .start()
        .await
        .unwrap();

    let handle = &engine;
    eventually("open position", Duration::from_secs(2), || async move {
        handle
            .position(&sym("BTCUSDT"))
            .await
            .is_some_and(|p| p.state == PositionState::Open)
    })
    .await;

    let mut events = Vec::new();
    drain(&mut risk, &mut events);
    let decisions = decisions(&events);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].1.verdict, Verdict::Approve);
    assert_eq!(decisions[0].1.approved_size, dec!(200));

    let position = engine.position(&sym("BTCUSDT")).await.unwrap();
    assert_eq!(position.quantity, dec!(2));
    assert_eq!(position.entry_price, dec!(100.05));
    assert!(position.stop_loss.is_some());
    assert_eq!(
        paper.exchange.net_quantity(&sym("BTCUSDT")).await,
        dec!(2)
    );
    // entry fee only
    assert_eq!(engine.ledger().await.balance, dec!(9999.91996));

    let report = engine.shutdown().await;
    assert_eq!(report.open_positions.len(), 1);
}

#[tokio::test]
async fn test_stop_loss_beats_signal_reversal() {
    let (paper, updates) =
        Paper::new(&[("BTCUSDT", vec![dec!(100), dec!(100), dec!(97)])]).await;
    let (_sub, mut lifecycle) = paper.bus.subscribe_channel(Topic::Lifecycle);
    let engine = paper
        .builder(config(&["BTCUSDT"], 1), updates)
        .start()
        .await
        .unwrap();

    let handle = &engine;
    eventually("open position", Duration::from_secs(1), || async move {
        handle
            .position(&sym("BTCUSDT"))
            .await
            .is_some_and(|p| p.state == PositionState::Open)
    })
    .await;
    // the next tick sees both the stop and a strong reversal
    paper.signals.set(Direction::Short, dec!(0.95)).await;

    let mut events = Vec::new();
    let closed = eventually_closed(&mut lifecycle, &mut events).await;
    assert_eq!(closed, Some(CloseReason::StopLoss));

    let handle = &engine;
    eventually("flat venue", Duration::from_secs(1), || async move {
        handle.position(&sym("BTCUSDT")).await.is_none()
    })
    .await;
    assert!(paper.exchange.net_quantity(&sym("BTCUSDT")).await.is_zero());
    engine.shutdown().await;
}

async fn eventually_closed(
    rx: &mut UnboundedReceiver<Arc<Envelope>>,
    events: &mut Vec<EngineEvent>,
) -> Option<CloseReason> {
    for _ in 0..300 {
        drain(rx, events);
        let closed = events.iter().find_map(|e| match e {
            EngineEvent::PositionClosed { reason, .. } => Some(*reason),
            _ => None,
        });
        if let Some(reason) = closed {
            return reason;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("position never closed");
}

#[tokio::test]
async fn test_three_timeouts_roll_the_position_back() {
    let (paper, updates) = Paper::new(&[("BTCUSDT", vec![dec!(100)])]).await;
    paper.exchange.hang_next(3).await;
    let (_sub, mut incidents) = paper.bus.subscribe_channel(Topic::Incident);
    let engine = paper
        .builder(config(&["BTCUSDT"], 30), updates)
        .start()
        .await
        .unwrap();

    let mut events = Vec::new();
    for _ in 0..200 {
        drain(&mut incidents, &mut events);
        if !events.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(matches!(
        events.first(),
        Some(EngineEvent::Incident(incident)) if incident.kind == IncidentKind::StuckOrder
    ));

    assert!(engine.position(&sym("BTCUSDT")).await.is_none());
    assert!(engine.orders().await.is_empty());
    assert_eq!(engine.ledger().await.exposure, Decimal::ZERO);
    assert!(paper.exchange.net_quantity(&sym("BTCUSDT")).await.is_zero());

    let report = engine.shutdown().await;
    assert!(report.is_flat());
}

#[tokio::test]
async fn test_daily_loss_halt_rejects_the_rest_of_the_day() {
    let (paper, updates) =
        Paper::new(&[("BTCUSDT", vec![dec!(100), dec!(100), dec!(90)])]).await;
    let (_sub, mut risk) = paper.bus.subscribe_channel(Topic::Risk);
    let mut config = config(&["BTCUSDT"], 1);
    config.risk.per_trade_cap = Percentage::new(Decimal::ONE);
    config.risk.max_exposure = Percentage::new(Decimal::ONE);
    let engine = paper.builder(config, updates).start().await.unwrap();

    let mut events = Vec::new();
    for _ in 0..400 {
        drain(&mut risk, &mut events);
        let rejected_after_halt = events
            .iter()
            .skip_while(|e| !matches!(e, EngineEvent::TradingHalted { .. }))
            .any(|e| matches!(e, EngineEvent::RiskAssessed { .. }));
        if rejected_after_halt {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let halt = events
        .iter()
        .position(|e| matches!(e, EngineEvent::TradingHalted { .. }))
        .expect("account halted");
    assert!(matches!(
        &events[halt],
        EngineEvent::TradingHalted {
            symbol: None,
            reason: HaltReason::DailyLossLimit,
            ..
        }
    ));
    let after: Vec<RiskDecision> = decisions(&events[halt..])
        .into_iter()
        .map(|(_, d)| d)
        .collect();
    assert!(!after.is_empty());
    assert!(
        after
            .iter()
            .all(|d| d.verdict == Verdict::Reject && d.reason == ReasonCode::DailyLossLimit)
    );
    assert_eq!(
        engine.halt_status().await.account.map(|r| r.reason),
        Some(HaltReason::DailyLossLimit)
    );
    engine.shutdown().await;
}

#[tokio::test]
async fn test_exposure_cap_and_one_position_per_symbol() {
    let flat = vec![dec!(100)];
    let (paper, updates) = Paper::new(&[
        ("BTCUSDT", flat.clone()),
        ("ETHUSDT", flat.clone()),
        ("SOLUSDT", flat),
    ])
    .await;
    let (_risk_sub, mut risk) = paper.bus.subscribe_channel(Topic::Risk);
    let (_life_sub, mut lifecycle) = paper.bus.subscribe_channel(Topic::Lifecycle);
    let mut config = config(&["BTCUSDT", "ETHUSDT", "SOLUSDT"], 1);
    config.risk.per_trade_cap = Percentage::new(dec!(0.5));
    config.risk.max_exposure = Percentage::new(dec!(0.6));
    let engine = paper.builder(config, updates).start().await.unwrap();

    // covers the first tick and the one after it
    tokio::time::sleep(Duration::from_millis(1_300)).await;

    let mut events = Vec::new();
    drain(&mut risk, &mut events);
    let first_round: Vec<RiskDecision> = decisions(&events)
        .into_iter()
        .take(3)
        .map(|(_, d)| d)
        .collect();
    assert_eq!(first_round.len(), 3);
    let approved: Decimal = first_round.iter().map(|d| d.approved_size).sum();
    assert!(approved <= dec!(6000));
    assert_eq!(
        first_round.iter().filter(|d| d.verdict == Verdict::Approve).count(),
        1
    );
    assert!(
        first_round
            .iter()
            .any(|d| d.verdict == Verdict::Reject && d.reason == ReasonCode::ExposureLimit)
    );

    let mut lifecycle_events = Vec::new();
    drain(&mut lifecycle, &mut lifecycle_events);
    let mut opened: HashMap<Symbol, usize> = HashMap::new();
    for event in &lifecycle_events {
        if let EngineEvent::PositionOpened { position } = event {
            *opened.entry(position.symbol.clone()).or_default() += 1;
        }
    }
    assert!(opened.values().all(|n| *n == 1));
    assert_eq!(engine.positions().await.len(), opened.len());
    // marks can sit a slippage above the admitted notional
    assert!(engine.ledger().await.exposure <= dec!(6003));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_restart_restores_positions_from_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let (paper, updates) = Paper::new(&[("BTCUSDT", vec![dec!(100)])]).await;

    let first = paper
        .builder(config(&["BTCUSDT"], 30), updates)
        .with_store(Arc::new(FileStateStore::new(&path)))
        .start()
        .await
        .unwrap();
    let handle = &first;
    eventually("open position", Duration::from_secs(2), || async move {
        handle
            .position(&sym("BTCUSDT"))
            .await
            .is_some_and(|p| p.state == PositionState::Open)
    })
    .await;
    let balance = first.ledger().await.balance;
    let report = first.shutdown().await;
    assert_eq!(report.open_positions.len(), 1);

    // the venue keeps the position across the restart
    paper.signals.set(Direction::Flat, dec!(0.9)).await;
    let updates = paper.exchange.reconnect().await;
    let store = Arc::new(FileStateStore::new(&path));
    let second = paper
        .builder(config(&["BTCUSDT"], 30), updates)
        .with_store(store.clone())
        .start()
        .await
        .unwrap();

    assert!(second.recovery().is_clean());
    assert_eq!(second.recovery().restored, vec![sym("BTCUSDT")]);
    let restored = second.position(&sym("BTCUSDT")).await.unwrap();
    assert_eq!(restored.state, PositionState::Open);
    assert_eq!(restored.quantity, dec!(2));
    assert_eq!(second.ledger().await.balance, balance);
    // reservation, or the notional once marked
    assert!(second.ledger().await.exposure >= dec!(200));

    second.close_all(CloseReason::Manual).await;
    let handle = &second;
    eventually("flat book", Duration::from_secs(2), || async move {
        handle.position(&sym("BTCUSDT")).await.is_none()
    })
    .await;
    let report = second.shutdown().await;
    assert!(report.is_flat());

    let persisted = store.load().await.unwrap();
    assert!(persisted.positions.is_empty());
    assert!(persisted.halts.account.is_some());
}

#[tokio::test]
async fn test_random_signals_never_double_up() {
    let feed = Arc::new(SimulatedFeed::new(40));
    for (i, symbol) in ["BTCUSDT", "ETHUSDT"].into_iter().enumerate() {
        feed.add_gbm(sym(symbol), dec!(100), 0.8, i as u64).await;
    }
    let (exchange, updates) = PaperExchange::new(PaperConfig::default(), feed.clone());
    let bus = EventBus::new();
    let (_sub, mut lifecycle) = bus.subscribe_channel(Topic::Lifecycle);
    let engine = EngineBuilder::new(config(&["BTCUSDT", "ETHUSDT"], 1))
        .with_snapshot_provider(feed)
        .with_signal_source(Arc::new(RandomSignalSource::new(9).with_min_confidence(0.6)))
        .with_exchange(exchange, updates)
        .with_store(Arc::new(MemoryStateStore::new()))
        .with_bus(bus)
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2_300)).await;
    let report = engine.shutdown().await;

    let mut events = Vec::new();
    drain(&mut lifecycle, &mut events);
    let mut open: HashMap<Symbol, i32> = HashMap::new();
    for event in &events {
        match event {
            EngineEvent::PositionOpened { position } => {
                let n = open.entry(position.symbol.clone()).or_default();
                *n += 1;
                assert!(*n <= 1, "second open position on {}", position.symbol);
            }
            EngineEvent::PositionClosed { position, .. } => {
                *open.entry(position.symbol.clone()).or_default() -= 1;
            }
            _ => {}
        }
    }
    assert!(report.open_positions.len() <= 2);
}
