//! Benchmarks for the metrics hot paths.
//!
//! Run with: cargo bench
//!
//! These benchmarks check that instrumentation stays negligible next to pool
//! operations:
//! - `inspect()`: a handful of atomic loads
//! - `register()` / `unregister()`: one map write each
//! - `snapshot_all()` / `render_text()`: proportional to the number of pools

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loom_pool_metrics::{
    render_text, FixedThreadPool, MetricIdentity, MetricsRegistry, PoolRecorders,
    WorkStealingPool,
};

fn populated_registry(pools: usize) -> MetricsRegistry {
    let registry = MetricsRegistry::new();
    for i in 0..pools {
        let identity = MetricIdentity::new("bench_executor")
            .with_tag("pool", format!("p{}", i));
        if let Some(set) = registry.register(identity, PoolRecorders::new) {
            set.queued_tasks.record(i as i64);
        }
    }
    registry
}

/// Benchmark pool inspection for both pool variants.
fn bench_inspect(c: &mut Criterion) {
    let stealing = WorkStealingPool::builder("bench-steal")
        .threads(2)
        .build()
        .expect("failed to build pool");
    let fixed = FixedThreadPool::builder("bench-fixed").max_threads(2).build();

    let mut group = c.benchmark_group("inspect");
    group.bench_function("work_stealing", |b| {
        let handle = stealing.handle();
        b.iter(|| black_box(handle.inspect()));
    });
    group.bench_function("fixed", |b| {
        let handle = fixed.handle();
        b.iter(|| black_box(handle.inspect()));
    });
    group.finish();
}

/// Benchmark a register/unregister cycle against registries of varying size.
fn bench_register_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_cycle");
    for pools in [0usize, 16, 256] {
        let registry = populated_registry(pools);
        let identity = MetricIdentity::new("bench_executor").with_tag("pool", "cycle");
        group.bench_with_input(BenchmarkId::from_parameter(pools), &pools, |b, _| {
            b.iter(|| {
                let set = registry.register(identity.clone(), PoolRecorders::new);
                black_box(set);
                registry.unregister(&identity);
            });
        });
    }
    group.finish();
}

/// Benchmark scrape cost with varying pool counts.
fn bench_scrape(c: &mut Criterion) {
    let mut group = c.benchmark_group("scrape");
    for pools in [1usize, 16, 256] {
        let registry = Arc::new(populated_registry(pools));
        group.throughput(Throughput::Elements(pools as u64));

        group.bench_with_input(BenchmarkId::new("snapshot_all", pools), &pools, |b, _| {
            b.iter(|| black_box(registry.snapshot_all()));
        });
        group.bench_with_input(BenchmarkId::new("render_text", pools), &pools, |b, _| {
            b.iter(|| black_box(render_text(&registry).expect("render failed")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_inspect, bench_register_cycle, bench_scrape);

criterion_main!(benches);
