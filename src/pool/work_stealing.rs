//! Work-stealing pool backed by rayon.
//!
//! Rayon does not report queue lengths, so the pool keeps its own atomic
//! counters around `spawn`:
//!
//! - tasks spawned from one of the pool's own workers land in that worker's
//!   deque and count as *queued tasks*;
//! - tasks spawned from any other thread go through rayon's injector and
//!   count as *queued submissions*;
//! - a guard counts *active workers* for as long as a task body runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::LifecycleHooks;
use crate::error::{MetricsError, Result};
use crate::inspector::{PoolHandle, WorkStealingStats};
use crate::tracker::PoolLifecycleListener;

#[derive(Default)]
struct StealCounters {
    local_queued: AtomicUsize,
    submitted: AtomicUsize,
    active: AtomicUsize,
    live_threads: AtomicUsize,
}

/// Decrements the active counter on drop, even if the task panics.
struct ActiveGuard {
    counters: Arc<StealCounters>,
}

impl ActiveGuard {
    fn new(counters: Arc<StealCounters>) -> Self {
        counters.active.fetch_add(1, Ordering::Relaxed);
        Self { counters }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Builder for [`WorkStealingPool`].
pub struct WorkStealingPoolBuilder {
    name: String,
    threads: Option<usize>,
    listener: Option<Arc<dyn PoolLifecycleListener>>,
}

impl WorkStealingPoolBuilder {
    /// Number of worker threads (default: rayon's default, one per CPU).
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }

    /// Listener notified on creation and shutdown.
    pub fn listener(mut self, listener: Arc<dyn PoolLifecycleListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Build the pool and fire the creation event.
    ///
    /// # Errors
    ///
    /// Returns an error if the rayon pool cannot be built.
    pub fn build(self) -> Result<Arc<WorkStealingPool>> {
        let counters = Arc::new(StealCounters::default());
        let name_prefix: Arc<str> = self.name.as_str().into();

        let start_counters = counters.clone();
        let exit_counters = counters.clone();
        let panic_prefix = name_prefix.clone();
        let start_prefix = name_prefix.clone();

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(move |i| format!("{}-steal-{:04}", name_prefix, i))
            .start_handler(move |thread_index| {
                start_counters.live_threads.fetch_add(1, Ordering::Relaxed);
                debug!(thread_index, pool = %start_prefix, "work-stealing thread starting");
            })
            .exit_handler(move |_thread_index| {
                exit_counters.live_threads.fetch_sub(1, Ordering::Relaxed);
            })
            .panic_handler(move |_| {
                warn!(pool = %panic_prefix, "task panicked in work-stealing pool");
            });
        if let Some(n) = self.threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;

        let hooks = LifecycleHooks::new(self.listener);
        let pool = Arc::new_cyclic(|this: &Weak<WorkStealingPool>| WorkStealingPool {
            name: self.name,
            pool,
            counters,
            hooks,
            this: this.clone(),
        });

        pool.hooks.created(&pool.name, pool.handle());
        Ok(pool)
    }
}

/// Rayon thread pool with health statistics and lifecycle events.
pub struct WorkStealingPool {
    name: String,
    pool: rayon::ThreadPool,
    counters: Arc<StealCounters>,
    hooks: LifecycleHooks,
    this: Weak<WorkStealingPool>,
}

impl WorkStealingPool {
    pub fn builder(name: impl Into<String>) -> WorkStealingPoolBuilder {
        WorkStealingPoolBuilder {
            name: name.into(),
            threads: None,
            listener: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-owning handle for inspection.
    pub fn handle(&self) -> PoolHandle {
        let weak: Weak<dyn WorkStealingStats> = self.this.clone();
        PoolHandle::WorkStealing(weak)
    }

    /// Spawn a fire-and-forget task.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::PoolShutdown`] after [`shutdown`](Self::shutdown).
    pub fn spawn<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.hooks.is_shut_down() {
            return Err(MetricsError::PoolShutdown(self.name.clone()));
        }

        let local = self.pool.current_thread_index().is_some();
        if local {
            self.counters.local_queued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        }

        let counters = self.counters.clone();
        self.pool.spawn(move || {
            if local {
                counters.local_queued.fetch_sub(1, Ordering::Relaxed);
            } else {
                counters.submitted.fetch_sub(1, Ordering::Relaxed);
            }
            let _guard = ActiveGuard::new(counters);
            f();
        });
        Ok(())
    }

    /// Run `f` inside the pool, blocking until it returns.
    ///
    /// Not counted in the queue statistics.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }

    /// Stop accepting tasks and fire the shutdown event.
    ///
    /// Tasks already queued still run. Calling this more than once has no
    /// further effect.
    pub fn shutdown(&self) {
        self.hooks.shutdown(&self.name, &self.handle());
    }

    pub fn is_shut_down(&self) -> bool {
        self.hooks.is_shut_down()
    }
}

impl WorkStealingStats for WorkStealingPool {
    fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn active_workers(&self) -> usize {
        self.counters.active.load(Ordering::Relaxed)
    }

    fn queued_tasks(&self) -> usize {
        self.counters.local_queued.load(Ordering::Relaxed)
    }

    fn queued_submissions(&self) -> usize {
        self.counters.submitted.load(Ordering::Relaxed)
    }

    fn pool_size(&self) -> usize {
        self.counters.live_threads.load(Ordering::Relaxed)
    }
}

impl Drop for WorkStealingPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkStealingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStealingPool")
            .field("name", &self.name)
            .field("threads", &self.pool.current_num_threads())
            .field("active", &self.active_workers())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
