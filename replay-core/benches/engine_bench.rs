//! Criterion benchmarks for the engine hot path.
//!
//! Benchmarks:
//! 1. Candle loop: momentum strategy + running aggregator over one batch
//! 2. Batch size: the same candles split into batches of varying size
//! 3. Aggregator alone: folding pre-built signals

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use replay_core::components::{Aggregator, Strategy};
use replay_core::domain::{Action, Candle, JobContext, JobId, Signal};
use replay_core::engine::BacktestEngine;
use replay_core::{MomentumStrategy, RunningAggregator};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_candles(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = (3_000_000_000_000.0 + (i as f64 * 0.01).sin() * 50_000_000_000.0) as u64;
            Candle::new(
                i as u64 * 60_000,
                close - 100_000_000,
                close + 200_000_000,
                close - 300_000_000,
                close,
                1.5,
            )
        })
        .collect()
}

fn make_engine(window: usize, capacity: usize) -> BacktestEngine<MomentumStrategy, RunningAggregator> {
    let strategy = MomentumStrategy::new(window);
    let ctx = JobContext::new(JobId::from_hash("bench"), "BTCUSDT", 0, u64::MAX);
    let aggregator = RunningAggregator::new(ctx, strategy.name());
    BacktestEngine::new(strategy, aggregator)
        .unwrap()
        .with_capacity_hint(capacity)
}

// ── 1. Candle loop ───────────────────────────────────────────────────

fn bench_candle_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("candle_loop");

    for &n in &[10_000usize, 100_000, 1_000_000] {
        let candles = make_candles(n);
        group.bench_with_input(BenchmarkId::new("momentum_w50", n), &candles, |b, candles| {
            b.iter(|| {
                let mut engine = make_engine(50, candles.len());
                engine.run(black_box(candles)).unwrap();
                black_box(engine.finalize().output_metrics())
            });
        });
    }

    group.finish();
}

// ── 2. Batch size ────────────────────────────────────────────────────

fn bench_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_size");
    let candles = make_candles(200_000);

    for &batch in &[100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let mut engine = make_engine(20, candles.len());
                for chunk in candles.chunks(batch) {
                    engine.run(black_box(chunk)).unwrap();
                }
                black_box(engine.history().len())
            });
        });
    }

    group.finish();
}

// ── 3. Aggregator alone ──────────────────────────────────────────────

fn bench_aggregator(c: &mut Criterion) {
    let signals: Vec<Signal> = (0..100_000i64)
        .map(|i| Signal::new(i as u64, Action::Buy, 100, 1.0).with_pnl((i % 17) - 8))
        .collect();

    c.bench_function("running_aggregator_100k", |b| {
        b.iter(|| {
            let ctx = JobContext::new(JobId::from_hash("bench"), "BTCUSDT", 0, u64::MAX);
            let mut agg = RunningAggregator::new(ctx, "momentum_w20");
            for s in &signals {
                agg.on_signal(black_box(s)).unwrap();
            }
            black_box(agg.output_metrics())
        });
    });

    c.bench_function("momentum_on_candle_100k", |b| {
        let candles = make_candles(100_000);
        b.iter(|| {
            let mut s = MomentumStrategy::new(20);
            for candle in &candles {
                black_box(s.on_candle(candle).unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_candle_loop, bench_batch_size, bench_aggregator);
criterion_main!(benches);
