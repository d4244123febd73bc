//! End-to-end tests: instrumented pools, tracker, sampler and renderer.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use loom_pool_metrics::{
    FixedThreadPool, Measurement, MetricIdentity, MetricsBuilder, MetricsRegistry, PoolHandle,
    PoolLifecycleListener, PoolLifecycleTracker, QueuedPoolStats, WorkStealingPool,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tracker(interval_ms: u64) -> Arc<PoolLifecycleTracker> {
    init_tracing();
    Arc::new(
        MetricsBuilder::new()
            .prefix("test")
            .sample_interval_ms(interval_ms)
            .build(tokio::runtime::Handle::current())
            .expect("tracker should build"),
    )
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Test that a work-stealing pool is tracked from build to shutdown
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_work_stealing_pool_lifecycle() {
    let tracker = tracker(10);
    let pool = WorkStealingPool::builder("compute")
        .threads(2)
        .listener(tracker.clone())
        .build()
        .unwrap();

    assert_eq!(tracker.tracked_pools(), vec!["compute".to_string()]);
    let recorders = tracker.recorders(&pool.handle()).unwrap();
    eventually("sampled", || recorders.current().maximum_pool_size == 2).await;

    pool.shutdown();
    assert!(tracker.tracked_pools().is_empty());
    assert!(tracker.registry().is_empty());
}

/// Test that a busy fixed pool shows up in the rendered exposition
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fixed_pool_rendered() {
    let tracker = tracker(10);
    let pool = FixedThreadPool::builder("io")
        .max_threads(2)
        .listener(tracker.clone())
        .build();

    let release = Arc::new(Barrier::new(3));
    for _ in 0..2 {
        let release = release.clone();
        pool.execute(move || {
            release.wait();
        })
        .unwrap();
    }
    eventually("workers busy", || pool.active_count() == 2).await;
    for _ in 0..3 {
        pool.execute(|| {}).unwrap();
    }

    let recorders = tracker.recorders(&pool.handle()).unwrap();
    let expected = Measurement {
        maximum_pool_size: 2,
        running_thread_count: 2,
        queue_task_count: 3,
        pool_size: 2,
    };
    eventually("busy sample", || recorders.current() == expected).await;

    let text = tracker.render().unwrap();
    assert!(text.contains("test_executor_queued_tasks{pool=\"io\"} 3"));
    assert!(text.contains("test_executor_active_threads{pool=\"io\"} 2"));
    assert!(text.contains("test_executor_max_pool_size{pool=\"io\"} 2"));

    // Release the workers on a blocking thread so the runtime keeps sampling
    let waiter = release.clone();
    tokio::task::spawn_blocking(move || waiter.wait()).await.unwrap();

    pool.shutdown();
    assert!(!tracker.render().unwrap().contains("pool=\"io\""));
    tokio::task::spawn_blocking(move || pool.join()).await.unwrap();
}

/// Test that the registry tracks exactly the open pools across a sequence of
/// creates and shutdowns
#[tokio::test]
async fn test_registry_matches_open_pools() {
    let tracker = tracker(1000);
    let mut open: Vec<(String, Arc<FixedThreadPool>)> = Vec::new();

    for step in 0..40usize {
        if step % 3 == 2 && !open.is_empty() {
            let index = (step * 7) % open.len();
            let (_, pool) = open.remove(index);
            pool.shutdown();
        } else {
            let id = format!("pool-{}", step);
            let pool = FixedThreadPool::builder(id.clone())
                .listener(tracker.clone())
                .build();
            open.push((id, pool));
        }

        let expected: BTreeSet<_> = open.iter().map(|(id, _)| id.clone()).collect();
        let tracked: BTreeSet<_> = tracker.tracked_pools().into_iter().collect();
        assert_eq!(tracked, expected);

        let registered: BTreeSet<_> = tracker
            .registry()
            .identities()
            .iter()
            .filter_map(|id| id.tag("pool").map(str::to_string))
            .collect();
        assert_eq!(registered, expected);
    }

    for (_, pool) in open.drain(..) {
        pool.shutdown();
    }
    assert!(tracker.registry().is_empty());
}

/// Test that events delivered directly by an external hook behave the same
#[tokio::test]
async fn test_external_events() {
    init_tracing();
    let registry = Arc::new(MetricsRegistry::new());
    let tracker = MetricsBuilder::new()
        .registry(registry.clone())
        .build(tokio::runtime::Handle::current())
        .unwrap();

    let foreign = Arc::new(Vec::<u8>::new());
    let handle = PoolHandle::opaque(&foreign);

    // Shutdown before create leaves the registry alone
    tracker.on_pool_shutdown(&handle);
    assert!(registry.is_empty());

    tracker.on_pool_created("foreign", handle.clone());
    let identity = MetricIdentity::new("loom_executor").with_tag("pool", "foreign");
    assert!(registry.contains(&identity));

    // Unknown pool shapes are sampled as zeros
    let snapshot = registry.snapshot_all();
    assert!(snapshot[0]
        .recorders
        .iter()
        .all(|r| r.value.as_i64() == Some(0)));

    tracker.on_pool_shutdown(&handle);
    tracker.on_pool_shutdown(&handle);
    assert!(registry.is_empty());
}

/// Test that dropping a pool without calling shutdown still retires its metrics
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_without_shutdown() {
    let tracker = tracker(10);
    let pool = WorkStealingPool::builder("short-lived")
        .threads(1)
        .listener(tracker.clone())
        .build()
        .unwrap();
    assert_eq!(tracker.registry().len(), 1);

    drop(pool);
    assert!(tracker.registry().is_empty());
    assert_eq!(tracker.prune(), 0);
}
