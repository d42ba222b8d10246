//! Aggregation throughput benchmarks.
//!
//! Run with: `cargo bench --package tickbar-bench`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tickbar_bench::{FeedShape, synthetic_ticks};
use tickbar_lib::prelude::*;

fn start() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(1_705_329_120, 0).unwrap()
}

/// Single-threaded fold through [`OpenBars`], no channels involved.
fn open_bars_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("open_bars");

    for symbols in [1, 16, 256] {
        let ticks = synthetic_ticks(FeedShape::new(symbols, 100_000, 10), start());
        group.throughput(Throughput::Elements(ticks.len() as u64));

        group.bench_with_input(BenchmarkId::new("m1", symbols), &ticks, |b, ticks| {
            b.iter(|| {
                let mut open = OpenBars::new(Interval::Minute1, "bench");
                for tick in ticks {
                    black_box(open.ingest(tick));
                }
                black_box(open.drain())
            });
        });
    }

    group.finish();
}

/// End-to-end engine ingest with a memory store and no subscribers.
fn engine_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("engine");
    group.sample_size(20);

    for shards in [1, 4] {
        let ticks = synthetic_ticks(FeedShape::new(64, 50_000, 10), start());
        group.throughput(Throughput::Elements(ticks.len() as u64));

        group.bench_with_input(BenchmarkId::new("shards", shards), &ticks, |b, ticks| {
            b.to_async(&runtime).iter(|| async {
                let config = EngineConfig {
                    shards,
                    ..EngineConfig::default()
                };
                let store = Arc::new(MemoryBarStore::new());
                let engine = Engine::builder(config).store(store).build().unwrap();
                for tick in ticks {
                    engine.ingest(tick.clone()).await.unwrap();
                }
                black_box(engine.shutdown().await)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, open_bars_benchmark, engine_benchmark);
criterion_main!(benches);
