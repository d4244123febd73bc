//! Fixed-size thread pool with a shared FIFO queue.
//!
//! Worker threads are started lazily, one per submitted task, until
//! `max_threads` exist. Queue length, active and live thread counts are
//! mirrored in atomics next to the queue so that inspection never takes the
//! queue lock.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::LifecycleHooks;
use crate::error::{MetricsError, Result};
use crate::inspector::{PoolHandle, QueuedPoolStats};
use crate::tracker::PoolLifecycleListener;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    queued: AtomicUsize,
    active: AtomicUsize,
    live: AtomicUsize,
}

impl Shared {
    /// Pop the next job, blocking while the queue is empty and open.
    fn next_job(&self) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                self.queued.fetch_sub(1, Ordering::Relaxed);
                return Some(job);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    fn run_worker(&self, pool: &str) {
        self.live.fetch_add(1, Ordering::Relaxed);
        while let Some(job) = self.next_job() {
            self.active.fetch_add(1, Ordering::Relaxed);
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            self.active.fetch_sub(1, Ordering::Relaxed);
            if result.is_err() {
                warn!(pool, "task panicked in fixed pool");
            }
        }
        self.live.fetch_sub(1, Ordering::Relaxed);
        debug!(pool, "fixed pool worker exiting");
    }
}

/// Builder for [`FixedThreadPool`].
pub struct FixedThreadPoolBuilder {
    name: String,
    max_threads: usize,
    queue_capacity: Option<usize>,
    listener: Option<Arc<dyn PoolLifecycleListener>>,
}

impl FixedThreadPoolBuilder {
    /// Maximum number of worker threads (minimum 1).
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = n.max(1);
        self
    }

    /// Bound the queue. Unbounded by default.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Listener notified on creation and shutdown.
    pub fn listener(mut self, listener: Arc<dyn PoolLifecycleListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Build the pool and fire the creation event. No threads are started
    /// until the first task is submitted.
    pub fn build(self) -> Arc<FixedThreadPool> {
        let hooks = LifecycleHooks::new(self.listener);
        let pool = Arc::new_cyclic(|this: &Weak<FixedThreadPool>| FixedThreadPool {
            name: self.name,
            max_threads: self.max_threads,
            queue_capacity: self.queue_capacity,
            shared: Arc::new(Shared::default()),
            workers: Mutex::new(Vec::new()),
            hooks,
            this: this.clone(),
        });

        pool.hooks.created(&pool.name, pool.handle());
        pool
    }
}

/// Bounded thread pool with a task queue, health statistics and lifecycle
/// events.
pub struct FixedThreadPool {
    name: String,
    max_threads: usize,
    queue_capacity: Option<usize>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    hooks: LifecycleHooks,
    this: Weak<FixedThreadPool>,
}

impl FixedThreadPool {
    pub fn builder(name: impl Into<String>) -> FixedThreadPoolBuilder {
        FixedThreadPoolBuilder {
            name: name.into(),
            max_threads: 1,
            queue_capacity: None,
            listener: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-owning handle for inspection.
    pub fn handle(&self) -> PoolHandle {
        let weak: Weak<dyn QueuedPoolStats> = self.this.clone();
        PoolHandle::Queued(weak)
    }

    /// Queue a task, starting a new worker if the pool is below its maximum.
    ///
    /// # Errors
    ///
    /// - [`MetricsError::PoolShutdown`] after [`shutdown`](Self::shutdown)
    /// - [`MetricsError::QueueFull`] if a bounded queue is at capacity
    /// - [`MetricsError::ThreadSpawn`] if a worker thread cannot be started;
    ///   the task stays queued for the existing workers
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(MetricsError::PoolShutdown(self.name.clone()));
            }
            if let Some(capacity) = self.queue_capacity {
                if state.jobs.len() >= capacity {
                    return Err(MetricsError::QueueFull {
                        pool: self.name.clone(),
                        capacity,
                    });
                }
            }
            state.jobs.push_back(Box::new(f));
            self.shared.queued.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.available.notify_one();
        self.ensure_worker()
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.len() >= self.max_threads {
            return Ok(());
        }

        let shared = self.shared.clone();
        let pool_name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-fixed-{:04}", self.name, workers.len()))
            .spawn(move || shared.run_worker(&pool_name))?;
        workers.push(handle);
        Ok(())
    }

    /// Stop accepting tasks and fire the shutdown event.
    ///
    /// Queued tasks are still drained by the workers, which then exit.
    /// Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        self.shared.state.lock().closed = true;
        self.shared.available.notify_all();
        self.hooks.shutdown(&self.name, &self.handle());
    }

    pub fn is_shut_down(&self) -> bool {
        self.hooks.is_shut_down()
    }

    /// Wait for all worker threads to exit. Call after [`shutdown`](Self::shutdown).
    ///
    /// A worker calling this on its own pool skips joining itself.
    pub fn join(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                warn!(pool = %self.name, "fixed pool worker panicked");
            }
        }
    }
}

impl QueuedPoolStats for FixedThreadPool {
    fn maximum_pool_size(&self) -> usize {
        self.max_threads
    }

    fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Relaxed)
    }

    fn queue_len(&self) -> usize {
        self.shared.queued.load(Ordering::Relaxed)
    }

    fn pool_size(&self) -> usize {
        self.shared.live.load(Ordering::Relaxed)
    }
}

impl Drop for FixedThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FixedThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedThreadPool")
            .field("name", &self.name)
            .field("max_threads", &self.max_threads)
            .field("queued", &self.queue_len())
            .field("active", &self.active_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
