//! Metric recorders: thread-safe holders of a single numeric series.
//!
//! # Semantics
//!
//! | Kind | `record(v)` | `snapshot()` |
//! |------|-------------|--------------|
//! | Gauge | atomic store | latest value, no reset |
//! | Counter | atomic add | delta since last snapshot (atomic swap) |
//! | Histogram | bucket observe (short mutex) | delta since last snapshot |
//!
//! Gauges and counters are single atomics, so a snapshot can never observe a
//! partially written value. Histograms hold several fields and are guarded by
//! a `parking_lot::Mutex` whose critical section is a handful of adds.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::inspector::Measurement;

/// The kind of a [`MetricRecorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderKind {
    Counter,
    Gauge,
    Histogram,
}

/// Point-in-time value taken from a recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedValue {
    /// Increments accumulated since the previous snapshot.
    Counter(i64),
    /// Latest recorded value.
    Gauge(i64),
    /// Observations accumulated since the previous snapshot.
    Histogram(HistogramSnapshot),
}

impl RecordedValue {
    pub fn kind(&self) -> RecorderKind {
        match self {
            RecordedValue::Counter(_) => RecorderKind::Counter,
            RecordedValue::Gauge(_) => RecorderKind::Gauge,
            RecordedValue::Histogram(_) => RecorderKind::Histogram,
        }
    }

    /// Scalar value for counters and gauges, `None` for histograms.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RecordedValue::Counter(v) | RecordedValue::Gauge(v) => Some(*v),
            RecordedValue::Histogram(_) => None,
        }
    }
}

/// Histogram contents at snapshot time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistogramSnapshot {
    /// `(upper_bound, cumulative_count)` pairs in ascending bound order.
    pub buckets: Vec<(f64, u64)>,
    pub sum: i64,
    pub count: u64,
}

/// A named recorder snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSnapshot {
    pub name: Arc<str>,
    pub help: Arc<str>,
    pub value: RecordedValue,
}

#[derive(Debug)]
struct HistogramCell {
    bounds: Vec<f64>,
    counts: Vec<u64>,
    sum: i64,
    count: u64,
}

impl HistogramCell {
    fn new(mut bounds: Vec<f64>) -> Self {
        bounds.retain(|b| b.is_finite());
        bounds.sort_by(|a, b| a.total_cmp(b));
        bounds.dedup();
        let counts = vec![0; bounds.len()];
        Self {
            bounds,
            counts,
            sum: 0,
            count: 0,
        }
    }

    fn observe(&mut self, value: i64) {
        let v = value as f64;
        if let Some(i) = self.bounds.iter().position(|b| v <= *b) {
            self.counts[i] += 1;
        }
        self.sum = self.sum.saturating_add(value);
        self.count += 1;
    }

    fn take(&mut self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .zip(self.counts.iter_mut())
            .map(|(bound, count)| {
                cumulative += std::mem::take(count);
                (*bound, cumulative)
            })
            .collect();
        HistogramSnapshot {
            buckets,
            sum: std::mem::take(&mut self.sum),
            count: std::mem::take(&mut self.count),
        }
    }
}

#[derive(Debug)]
enum Cell {
    Counter(AtomicI64),
    Gauge(AtomicI64),
    Histogram(Mutex<HistogramCell>),
}

/// A single named metric with thread-safe update and snapshot.
#[derive(Debug)]
pub struct MetricRecorder {
    name: Arc<str>,
    help: Arc<str>,
    cell: Cell,
}

impl MetricRecorder {
    /// Create a counter with delta-since-last-snapshot semantics.
    pub fn counter(name: impl Into<Arc<str>>, help: impl Into<Arc<str>>) -> Self {
        Self::with_cell(name, help, Cell::Counter(AtomicI64::new(0)))
    }

    /// Create a gauge holding the latest recorded value.
    pub fn gauge(name: impl Into<Arc<str>>, help: impl Into<Arc<str>>) -> Self {
        Self::with_cell(name, help, Cell::Gauge(AtomicI64::new(0)))
    }

    /// Create a histogram with the given bucket upper bounds.
    ///
    /// Non-finite bounds are dropped; an implicit `+Inf` bucket is always
    /// present at exposition time.
    pub fn histogram(
        name: impl Into<Arc<str>>,
        help: impl Into<Arc<str>>,
        buckets: Vec<f64>,
    ) -> Self {
        Self::with_cell(
            name,
            help,
            Cell::Histogram(Mutex::new(HistogramCell::new(buckets))),
        )
    }

    fn with_cell(name: impl Into<Arc<str>>, help: impl Into<Arc<str>>, cell: Cell) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            cell,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> RecorderKind {
        match self.cell {
            Cell::Counter(_) => RecorderKind::Counter,
            Cell::Gauge(_) => RecorderKind::Gauge,
            Cell::Histogram(_) => RecorderKind::Histogram,
        }
    }

    /// Record a measurement.
    #[inline]
    pub fn record(&self, value: i64) {
        match &self.cell {
            Cell::Counter(v) => {
                v.fetch_add(value, Ordering::Relaxed);
            }
            Cell::Gauge(v) => v.store(value, Ordering::Relaxed),
            Cell::Histogram(h) => h.lock().observe(value),
        }
    }

    /// Take a snapshot. Counters and histograms are reset atomically.
    pub fn snapshot(&self) -> RecorderSnapshot {
        let value = match &self.cell {
            Cell::Counter(v) => RecordedValue::Counter(v.swap(0, Ordering::AcqRel)),
            Cell::Gauge(v) => RecordedValue::Gauge(v.load(Ordering::Acquire)),
            Cell::Histogram(h) => RecordedValue::Histogram(h.lock().take()),
        };
        RecorderSnapshot {
            name: Arc::clone(&self.name),
            help: Arc::clone(&self.help),
            value,
        }
    }
}

/// A group of recorders registered under one identity.
pub trait RecorderSet: Send + Sync {
    /// Snapshot every recorder in the set.
    fn collect(&self) -> Vec<RecorderSnapshot>;
}

impl RecorderSet for MetricRecorder {
    fn collect(&self) -> Vec<RecorderSnapshot> {
        vec![self.snapshot()]
    }
}

/// The four pool-health gauges tracked for each instrumented pool.
#[derive(Debug)]
pub struct PoolRecorders {
    /// Configured maximum (or parallelism) of the pool
    pub max_pool_size: MetricRecorder,
    /// Threads currently running a task
    pub active_threads: MetricRecorder,
    /// Tasks waiting to run
    pub queued_tasks: MetricRecorder,
    /// Threads currently alive in the pool
    pub pool_size: MetricRecorder,
}

impl Default for PoolRecorders {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRecorders {
    pub fn new() -> Self {
        Self {
            max_pool_size: MetricRecorder::gauge("max_pool_size", "Maximum pool size"),
            active_threads: MetricRecorder::gauge(
                "active_threads",
                "Threads currently executing tasks",
            ),
            queued_tasks: MetricRecorder::gauge("queued_tasks", "Tasks waiting in the pool queue"),
            pool_size: MetricRecorder::gauge("pool_size", "Current number of pool threads"),
        }
    }

    /// Write one measurement into the four gauges.
    pub fn record(&self, m: &Measurement) {
        self.max_pool_size.record(saturating_i64(m.maximum_pool_size));
        self.active_threads.record(saturating_i64(m.running_thread_count));
        self.queued_tasks.record(saturating_i64(m.queue_task_count));
        self.pool_size.record(saturating_i64(m.pool_size));
    }

    /// Read the gauges back as a measurement.
    pub fn current(&self) -> Measurement {
        let read = |r: &MetricRecorder| {
            r.snapshot()
                .value
                .as_i64()
                .map_or(0, |v| usize::try_from(v).unwrap_or(0))
        };
        Measurement {
            maximum_pool_size: read(&self.max_pool_size),
            running_thread_count: read(&self.active_threads),
            queue_task_count: read(&self.queued_tasks),
            pool_size: read(&self.pool_size),
        }
    }
}

impl RecorderSet for PoolRecorders {
    fn collect(&self) -> Vec<RecorderSnapshot> {
        vec![
            self.max_pool_size.snapshot(),
            self.active_threads.snapshot(),
            self.queued_tasks.snapshot(),
            self.pool_size.snapshot(),
        ]
    }
}

fn saturating_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
