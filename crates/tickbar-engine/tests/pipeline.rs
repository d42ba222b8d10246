//! End-to-end tests of the tick-to-bar pipeline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tickbar_aggregate::{IngestOutcome, OpenBars};
use tickbar_engine::{BarCommitter, Engine, EngineConfig, StoreOutcome};
use tickbar_notify::{FnSubscriber, Notifier, Subscriber, SubscriberRegistry, SubscriberResult};
use tickbar_store::{
    BarStore, MemoryBarStore, Result as StoreResult, RetryPolicy, StoreRetrier, Upsert,
};
use tickbar_types::{Bar, BarKey, DEFAULT_SOURCE, Interval, Tick};
use tokio::time::Instant;

fn at(minute: u32, second: u32, millis: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 14, minute, second).unwrap() + TimeDelta::milliseconds(millis)
}

fn tick(symbol: &str, price: Decimal, volume: u64, timestamp: DateTime<Utc>) -> Tick {
    Tick::new(symbol, price, volume, timestamp)
}

fn config(shards: usize) -> EngineConfig {
    EngineConfig {
        shards,
        ..EngineConfig::default()
    }
}

type Seen = Arc<Mutex<Vec<Bar>>>;

fn collector(name: &str) -> (Arc<dyn Subscriber>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscriber = FnSubscriber::new(name, move |bar: &Bar| -> SubscriberResult {
        sink.lock().unwrap().push(bar.clone());
        Ok(())
    });
    (Arc::new(subscriber), seen)
}

fn aapl_scenario() -> Vec<Tick> {
    vec![
        tick("AAPL", dec!(150.00), 100, at(32, 5, 0)),
        tick("AAPL", dec!(151.50), 200, at(32, 15, 0)),
        tick("AAPL", dec!(149.00), 150, at(32, 25, 0)),
        tick("AAPL", dec!(150.75), 250, at(32, 35, 0)),
        tick("AAPL", dec!(152.00), 50, at(33, 5, 0)),
    ]
}

async fn wait_for_row(store: &MemoryBarStore, key: &BarKey) -> Bar {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(bar) = store.get(key).await.unwrap() {
                return bar;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bar was not committed")
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Runs ticks through a single-owner book to get the expected bars.
fn reference_bars(ticks: &[Tick]) -> Vec<Bar> {
    let mut book = OpenBars::new(Interval::Minute1, DEFAULT_SOURCE);
    let mut bars = Vec::new();
    for tick in ticks {
        if let IngestOutcome::Rolled(bar) = book.ingest(tick) {
            bars.push(bar);
        }
    }
    bars.extend(book.drain());
    bars
}

#[tokio::test]
async fn aapl_scenario_rolls_on_next_minute() {
    let store = Arc::new(MemoryBarStore::new());
    let (subscriber, seen) = collector("collect");
    let engine = Engine::builder(config(2))
        .store(store.clone())
        .subscriber(subscriber)
        .build()
        .unwrap();

    for tick in aapl_scenario() {
        engine.ingest(tick).await.unwrap();
    }

    let bar = wait_for_row(&store, &BarKey::new("AAPL", at(32, 0, 0))).await;
    assert_eq!(bar.open(), dec!(150.00));
    assert_eq!(bar.high(), dec!(151.50));
    assert_eq!(bar.low(), dec!(149.00));
    assert_eq!(bar.close(), dec!(150.75));
    assert_eq!(bar.volume(), 700);
    assert_eq!(bar.tick_count(), 4);
    assert_eq!(bar.source(), "tickbar");
    assert_eq!(engine.metrics().aggregator.open_bars, 1);

    let report = engine.shutdown().await;
    assert_eq!(report.bars_flushed, 1);
    assert_eq!(report.bars_dropped, 0);
    assert!(!report.timed_out);

    let next = store.get(&BarKey::new("AAPL", at(33, 0, 0))).await.unwrap().unwrap();
    assert_eq!(next.open(), dec!(152.00));
    assert_eq!(next.tick_count(), 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], bar);
    assert_eq!(seen[1], next);
}

#[tokio::test]
async fn fold_matches_tick_sequence() {
    let prices = [
        dec!(10.5),
        dec!(10.25),
        dec!(11.0),
        dec!(9.75),
        dec!(10.0),
        dec!(10.0),
        dec!(12.125),
        dec!(11.5),
    ];
    let ticks: Vec<_> = prices
        .iter()
        .enumerate()
        .map(|(i, price)| tick("MSFT", *price, (i as u64 + 1) * 10, at(40, (i * 7) as u32, 0)))
        .collect();

    let store = Arc::new(MemoryBarStore::new());
    let engine = Engine::builder(config(1)).store(store.clone()).build().unwrap();
    for tick in ticks {
        engine.ingest(tick).await.unwrap();
    }
    engine.shutdown().await;

    let bars = store.bars("MSFT").await.unwrap();
    assert_eq!(bars.len(), 1);
    let bar = &bars[0];
    assert_eq!(bar.interval_start(), at(40, 0, 0));
    assert_eq!(bar.open(), dec!(10.5));
    assert_eq!(bar.close(), dec!(11.5));
    assert_eq!(bar.high(), dec!(12.125));
    assert_eq!(bar.low(), dec!(9.75));
    assert_eq!(bar.volume(), 360);
    assert_eq!(bar.tick_count(), 8);
    assert!(bar.is_consistent());
}

#[tokio::test]
async fn boundary_tick_belongs_to_next_interval() {
    let store = Arc::new(MemoryBarStore::new());
    let engine = Engine::builder(config(1)).store(store.clone()).build().unwrap();

    engine.ingest(tick("AAPL", dec!(100), 1, at(32, 59, 999))).await.unwrap();
    engine.ingest(tick("AAPL", dec!(101), 1, at(33, 0, 0))).await.unwrap();
    engine.shutdown().await;

    let bars = store.bars("AAPL").await.unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].interval_start(), at(32, 0, 0));
    assert_eq!(bars[0].close(), dec!(100));
    assert_eq!(bars[1].interval_start(), at(33, 0, 0));
    assert_eq!(bars[1].open(), dec!(101));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn symbols_are_independent_under_concurrency() {
    let symbols: Vec<String> = (0..8).map(|i| format!("SYM{i}")).collect();
    let per_symbol: Vec<Vec<Tick>> = symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| {
            (0..120u32)
                .map(|j| {
                    let price = Decimal::from(100 + i as i64) + Decimal::new(i64::from(j * 7 % 13), 2);
                    let timestamp = at(10, 0, 0) + TimeDelta::seconds(i64::from(j) * 2);
                    tick(symbol, price, u64::from(j) + 1, timestamp)
                })
                .collect()
        })
        .collect();

    let store = Arc::new(MemoryBarStore::new());
    let engine = Arc::new(Engine::builder(config(3)).store(store.clone()).build().unwrap());

    let mut tasks = Vec::new();
    for ticks in per_symbol.clone() {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            for tick in ticks {
                engine.ingest(tick).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let engine = Arc::into_inner(engine).unwrap();
    engine.shutdown().await;

    for (symbol, ticks) in symbols.iter().zip(&per_symbol) {
        let stored = store.bars(symbol).await.unwrap();
        assert_eq!(stored, reference_bars(ticks), "bars differ for {symbol}");
        assert_eq!(stored.len(), 4);
    }
}

#[tokio::test]
async fn committing_twice_keeps_one_row() {
    let store = Arc::new(MemoryBarStore::new());
    let notifier = Notifier::spawn(SubscriberRegistry::new().freeze(), Duration::from_secs(1), 8);
    let retrier = StoreRetrier::spawn(store.clone(), RetryPolicy::default(), 8);
    let committer = BarCommitter::new(store.clone(), notifier, retrier, Duration::from_secs(1));

    let bar = reference_bars(&aapl_scenario()).remove(0);
    assert_eq!(
        committer.commit(bar.clone()).await.store,
        StoreOutcome::Written(Upsert::Inserted)
    );
    assert_eq!(
        committer.commit(bar.clone()).await.store,
        StoreOutcome::Written(Upsert::Unchanged)
    );

    assert_eq!(store.len().await, 1);
    assert_eq!(store.get(&bar.key()).await.unwrap(), Some(bar));
}

#[tokio::test]
async fn replaying_a_feed_does_not_duplicate_rows() {
    let store = Arc::new(MemoryBarStore::new());

    for _ in 0..2 {
        let engine = Engine::builder(config(2)).store(store.clone()).build().unwrap();
        for tick in aapl_scenario() {
            engine.ingest(tick).await.unwrap();
        }
        engine.shutdown().await;
    }

    let stored = store.bars("AAPL").await.unwrap();
    assert_eq!(stored, reference_bars(&aapl_scenario()));
    assert_eq!(store.writes(), 2);
}

#[tokio::test]
async fn flush_emits_one_bar_per_open_symbol() {
    let (subscriber, seen) = collector("collect");
    let engine = Engine::builder(config(4)).subscriber(subscriber).build().unwrap();

    let symbols = ["AAPL", "MSFT", "GOOG", "AMZN", "NVDA"];
    for (i, symbol) in symbols.iter().enumerate() {
        engine
            .ingest(tick(symbol, Decimal::from(100 + i as i64), 10, at(32, 1, 0)))
            .await
            .unwrap();
        engine
            .ingest(tick(symbol, Decimal::from(101 + i as i64), 10, at(32, 2, 0)))
            .await
            .unwrap();
    }

    assert_eq!(engine.flush().await.unwrap(), symbols.len());
    let metrics = engine.metrics();
    assert_eq!(metrics.aggregator.open_bars, 0);
    assert_eq!(metrics.aggregator.bars_finalized, symbols.len() as u64);

    wait_until(|| seen.lock().unwrap().len() == symbols.len()).await;
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), symbols.len());
        let mut names: Vec<_> = seen.iter().map(|bar| bar.symbol().to_string()).collect();
        names.sort();
        let mut expected: Vec<_> = symbols.iter().map(|s| (*s).to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    assert_eq!(engine.flush().await.unwrap(), 0);
    let report = engine.shutdown().await;
    assert_eq!(report.bars_flushed, 0);
}

#[tokio::test]
async fn failing_subscribers_do_not_block_others_or_storage() {
    let errors: Arc<dyn Subscriber> = Arc::new(FnSubscriber::new("errors", |_: &Bar| -> SubscriberResult {
        Err("rejected".into())
    }));
    let panics: Arc<dyn Subscriber> =
        Arc::new(FnSubscriber::new("panics", |_: &Bar| -> SubscriberResult {
            panic!("indicator bug")
        }));
    let (healthy, seen) = collector("healthy");

    let store = Arc::new(MemoryBarStore::new());
    let engine = Engine::builder(config(2))
        .store(store.clone())
        .subscriber(errors)
        .subscriber(panics)
        .subscriber(healthy)
        .build()
        .unwrap();

    for tick in aapl_scenario() {
        engine.ingest(tick).await.unwrap();
    }
    engine.ingest(tick("MSFT", dec!(400), 5, at(32, 10, 0))).await.unwrap();
    engine.flush().await.unwrap();
    assert_eq!(store.len().await, 3);

    let metrics = engine.shutdown().await.metrics;
    assert_eq!(metrics.notify.delivered, 3);
    assert_eq!(metrics.notify.failed, 3);
    assert_eq!(metrics.notify.panicked, 3);
    assert_eq!(metrics.store.store_writes, 3);
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn duplicate_subscriber_names_are_rejected() {
    let (first, _) = collector("alerts");
    let (second, _) = collector("alerts");

    let result = Engine::builder(config(1))
        .subscriber(first)
        .subscriber(second)
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn late_ticks_are_dropped_and_counted() {
    let store = Arc::new(MemoryBarStore::new());
    let engine = Engine::builder(config(1)).store(store.clone()).build().unwrap();

    engine.ingest(tick("AAPL", dec!(150), 10, at(33, 5, 0))).await.unwrap();
    engine.ingest(tick("AAPL", dec!(999), 10, at(32, 50, 0))).await.unwrap();
    engine.flush().await.unwrap();

    assert_eq!(engine.metrics().aggregator.late_ticks, 1);
    let bars = store.bars("AAPL").await.unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].high(), dec!(150));

    engine.shutdown().await;
}

/// Subscriber that never returns.
struct Hangs;

#[async_trait]
impl Subscriber for Hangs {
    fn name(&self) -> &str {
        "hangs"
    }

    async fn on_bar(&self, _bar: Arc<Bar>) -> SubscriberResult {
        std::future::pending().await
    }
}

/// Store whose writes never finish.
#[derive(Debug)]
struct StuckStore;

#[async_trait]
impl BarStore for StuckStore {
    async fn upsert(&self, _bar: &Bar) -> StoreResult<Upsert> {
        std::future::pending().await
    }

    async fn get(&self, _key: &BarKey) -> StoreResult<Option<Bar>> {
        Ok(None)
    }

    async fn bars(&self, _symbol: &str) -> StoreResult<Vec<Bar>> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn hung_subscriber_does_not_stall_other_symbols() {
    let (healthy, seen) = collector("healthy");
    let engine = Engine::builder(config(1))
        .subscriber(Arc::new(Hangs))
        .subscriber(healthy)
        .build()
        .unwrap();
    let timeout = engine.config().subscriber_timeout();

    // Nine AAPL bars finalize, each leaving the hung subscriber busy.
    for minute in 0..10 {
        engine
            .ingest(tick("AAPL", dec!(150), 1, at(minute, 30, 0)))
            .await
            .unwrap();
    }

    engine.ingest(tick("MSFT", dec!(400), 1, at(10, 0, 0))).await.unwrap();
    let boundary = Instant::now();
    engine.ingest(tick("MSFT", dec!(401), 1, at(11, 0, 0))).await.unwrap();

    loop {
        if seen.lock().unwrap().iter().any(|bar| bar.symbol() == "MSFT") {
            break;
        }
        assert!(
            boundary.elapsed() < timeout,
            "MSFT bar was held behind the hung subscriber"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(boundary.elapsed() < timeout);

    let aapl: Vec<_> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|bar| bar.symbol() == "AAPL")
        .map(Bar::interval_start)
        .collect();
    assert_eq!(aapl, (0..9).map(|minute| at(minute, 0, 0)).collect::<Vec<_>>());

    let report = engine.shutdown().await;
    assert_eq!(report.bars_dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_deadline_reports_uncommitted_bars() {
    let config = EngineConfig {
        shards: 1,
        store_timeout_ms: 3_600_000,
        shutdown_timeout_ms: 200,
        ..EngineConfig::default()
    };
    let engine = Engine::builder(config)
        .store(Arc::new(StuckStore))
        .build()
        .unwrap();

    for symbol in ["AAPL", "MSFT", "GOOG"] {
        engine.ingest(tick(symbol, dec!(100), 1, at(32, 5, 0))).await.unwrap();
    }

    let report = engine.shutdown().await;
    assert!(report.timed_out);
    assert_eq!(report.bars_flushed, 0);
    assert_eq!(report.bars_dropped, 3);
    assert_eq!(report.metrics.store.store_writes, 0);
    assert!(report.elapsed >= Duration::from_millis(200));
    assert!(report.elapsed < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn shutdown_deadline_cuts_off_hung_subscriber() {
    let config = EngineConfig {
        shards: 2,
        subscriber_timeout_ms: 60_000,
        shutdown_timeout_ms: 200,
        ..EngineConfig::default()
    };
    let store = Arc::new(MemoryBarStore::new());
    let (healthy, seen) = collector("healthy");
    let engine = Engine::builder(config)
        .store(store.clone())
        .subscriber(Arc::new(Hangs))
        .subscriber(healthy)
        .build()
        .unwrap();

    for symbol in ["AAPL", "MSFT", "GOOG"] {
        engine.ingest(tick(symbol, dec!(100), 1, at(32, 5, 0))).await.unwrap();
    }

    let report = engine.shutdown().await;
    assert!(report.timed_out);
    assert_eq!(report.bars_flushed, 3);
    assert_eq!(report.bars_dropped, 0);
    assert_eq!(store.len().await, 3);
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(report.metrics.notify.delivered, 3);
    assert_eq!(report.metrics.notify.dropped, 3);
    assert_eq!(report.metrics.notify.pending, 0);
}
