//! Pool inspection: turn a pool handle into a uniform [`Measurement`].
//!
//! Pools are referenced through [`PoolHandle`], a tagged enum over the pool
//! shapes this crate understands. Every variant holds a `Weak` reference, so a
//! handle never keeps a pool alive and a sampler racing with shutdown simply
//! sees a dead handle.
//!
//! | Variant | max | running | queued | size |
//! |---------|-----|---------|--------|------|
//! | `WorkStealing` | parallelism | active workers | queued + submissions | pool size |
//! | `Queued` | maximum pool size | active count | queue length | pool size |
//! | `Delegating` | unwrap one level, then as above | | | |
//! | `Opaque` / dead | 0 | 0 | 0 | 0 |

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// One sampled reading of a pool's health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    pub maximum_pool_size: usize,
    pub running_thread_count: usize,
    pub queue_task_count: usize,
    pub pool_size: usize,
}

/// Statistics exposed by a work-stealing pool.
///
/// Implementations must answer from atomics or other non-blocking state;
/// these are called from the sampler while tasks are being dispatched.
pub trait WorkStealingStats: Send + Sync {
    /// Target number of worker threads.
    fn parallelism(&self) -> usize;
    /// Workers currently running a task.
    fn active_workers(&self) -> usize;
    /// Tasks queued in worker-local deques.
    fn queued_tasks(&self) -> usize;
    /// Tasks submitted from outside the pool that have not started.
    fn queued_submissions(&self) -> usize;
    /// Worker threads currently alive.
    fn pool_size(&self) -> usize;
}

/// Statistics exposed by a fixed-size pool with a task queue.
pub trait QueuedPoolStats: Send + Sync {
    fn maximum_pool_size(&self) -> usize;
    fn active_count(&self) -> usize;
    fn queue_len(&self) -> usize;
    fn pool_size(&self) -> usize;
}

/// An adapter that forwards to another pool.
pub trait DelegatingPool: Send + Sync {
    /// Handle of the wrapped pool.
    fn delegate(&self) -> PoolHandle;
}

/// Opaque, non-owning reference to an executor pool.
#[derive(Clone)]
pub enum PoolHandle {
    WorkStealing(Weak<dyn WorkStealingStats>),
    Queued(Weak<dyn QueuedPoolStats>),
    Delegating(Weak<dyn DelegatingPool>),
    /// A pool of a shape this crate cannot read.
    Opaque(Weak<dyn Any + Send + Sync>),
}

/// Identity of a pool allocation, used to key tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey(usize);

impl PoolHandle {
    pub fn work_stealing<P: WorkStealingStats + 'static>(pool: &Arc<P>) -> Self {
        let weak = Arc::downgrade(pool) as Weak<dyn WorkStealingStats>;
        PoolHandle::WorkStealing(weak)
    }

    pub fn queued<P: QueuedPoolStats + 'static>(pool: &Arc<P>) -> Self {
        let weak = Arc::downgrade(pool) as Weak<dyn QueuedPoolStats>;
        PoolHandle::Queued(weak)
    }

    pub fn delegating<P: DelegatingPool + 'static>(pool: &Arc<P>) -> Self {
        let weak = Arc::downgrade(pool) as Weak<dyn DelegatingPool>;
        PoolHandle::Delegating(weak)
    }

    pub fn opaque<P: Any + Send + Sync>(pool: &Arc<P>) -> Self {
        let weak = Arc::downgrade(pool) as Weak<dyn Any + Send + Sync>;
        PoolHandle::Opaque(weak)
    }

    /// Allocation identity of the referenced pool.
    ///
    /// Stable for as long as the handle (or any clone of it) exists, even
    /// after the pool itself has been dropped.
    pub fn key(&self) -> PoolKey {
        let ptr = match self {
            PoolHandle::WorkStealing(w) => w.as_ptr() as *const (),
            PoolHandle::Queued(w) => w.as_ptr() as *const (),
            PoolHandle::Delegating(w) => w.as_ptr() as *const (),
            PoolHandle::Opaque(w) => w.as_ptr() as *const (),
        };
        PoolKey(ptr as usize)
    }

    /// Whether the referenced pool is still alive.
    pub fn is_alive(&self) -> bool {
        match self {
            PoolHandle::WorkStealing(w) => w.strong_count() > 0,
            PoolHandle::Queued(w) => w.strong_count() > 0,
            PoolHandle::Delegating(w) => w.strong_count() > 0,
            PoolHandle::Opaque(w) => w.strong_count() > 0,
        }
    }

    /// Short variant name, used in logs.
    pub fn variant(&self) -> &'static str {
        match self {
            PoolHandle::WorkStealing(_) => "work_stealing",
            PoolHandle::Queued(_) => "queued",
            PoolHandle::Delegating(_) => "delegating",
            PoolHandle::Opaque(_) => "opaque",
        }
    }

    /// Inspect the pool. See [`inspect`].
    pub fn inspect(&self) -> Measurement {
        inspect(self)
    }
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("variant", &self.variant())
            .field("key", &self.key())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Produce a measurement for `handle`.
///
/// A delegating adapter is unwrapped exactly once. Unknown shapes, nested
/// adapters and pools that have already been dropped all yield an all-zero
/// measurement; this function never fails.
pub fn inspect(handle: &PoolHandle) -> Measurement {
    match handle {
        PoolHandle::Delegating(adapter) => adapter
            .upgrade()
            .map(|adapter| inspect_direct(&adapter.delegate()))
            .unwrap_or_default(),
        direct => inspect_direct(direct),
    }
}

fn inspect_direct(handle: &PoolHandle) -> Measurement {
    match handle {
        PoolHandle::WorkStealing(pool) => pool
            .upgrade()
            .map(|p| Measurement {
                maximum_pool_size: p.parallelism(),
                running_thread_count: p.active_workers(),
                queue_task_count: p.queued_tasks().saturating_add(p.queued_submissions()),
                pool_size: p.pool_size(),
            })
            .unwrap_or_default(),
        PoolHandle::Queued(pool) => pool
            .upgrade()
            .map(|p| Measurement {
                maximum_pool_size: p.maximum_pool_size(),
                running_thread_count: p.active_count(),
                queue_task_count: p.queue_len(),
                pool_size: p.pool_size(),
            })
            .unwrap_or_default(),
        PoolHandle::Delegating(_) | PoolHandle::Opaque(_) => Measurement::default(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FakeStealing {
        pub parallelism: usize,
        pub active: usize,
        pub queued: usize,
        pub submissions: usize,
        pub size: usize,
    }

    impl WorkStealingStats for FakeStealing {
        fn parallelism(&self) -> usize {
            self.parallelism
        }
        fn active_workers(&self) -> usize {
            self.active
        }
        fn queued_tasks(&self) -> usize {
            self.queued
        }
        fn queued_submissions(&self) -> usize {
            self.submissions
        }
        fn pool_size(&self) -> usize {
            self.size
        }
    }

    pub(crate) struct FakeQueued {
        pub max: usize,
        pub active: usize,
        pub queue_len: usize,
        pub size: usize,
    }

    impl QueuedPoolStats for FakeQueued {
        fn maximum_pool_size(&self) -> usize {
            self.max
        }
        fn active_count(&self) -> usize {
            self.active
        }
        fn queue_len(&self) -> usize {
            self.queue_len
        }
        fn pool_size(&self) -> usize {
            self.size
        }
    }

    struct Adapter(PoolHandle);

    impl DelegatingPool for Adapter {
        fn delegate(&self) -> PoolHandle {
            self.0.clone()
        }
    }

    pub(crate) fn stealing() -> Arc<FakeStealing> {
        Arc::new(FakeStealing {
            parallelism: 4,
            active: 2,
            queued: 3,
            submissions: 1,
            size: 4,
        })
    }

    pub(crate) fn queued() -> Arc<FakeQueued> {
        Arc::new(FakeQueued {
            max: 10,
            active: 5,
            queue_len: 7,
            size: 6,
        })
    }

    fn m(max: usize, running: usize, queued: usize, size: usize) -> Measurement {
        Measurement {
            maximum_pool_size: max,
            running_thread_count: running,
            queue_task_count: queued,
            pool_size: size,
        }
    }

    #[test]
    fn test_inspect_work_stealing() {
        let pool = stealing();
        assert_eq!(inspect(&PoolHandle::work_stealing(&pool)), m(4, 2, 4, 4));
    }

    #[test]
    fn test_inspect_queued() {
        let pool = queued();
        assert_eq!(inspect(&PoolHandle::queued(&pool)), m(10, 5, 7, 6));
    }

    #[test]
    fn test_inspect_opaque_is_zero() {
        let pool = Arc::new(String::from("not a pool"));
        assert_eq!(inspect(&PoolHandle::opaque(&pool)), Measurement::default());
    }

    #[test]
    fn test_inspect_dead_handle_is_zero() {
        let pool = stealing();
        let handle = PoolHandle::work_stealing(&pool);
        assert!(handle.is_alive());

        drop(pool);
        assert!(!handle.is_alive());
        assert_eq!(inspect(&handle), Measurement::default());
    }

    #[test]
    fn test_delegating_unwraps_one_level() {
        let pool = queued();
        let adapter = Arc::new(Adapter(PoolHandle::queued(&pool)));
        assert_eq!(inspect(&PoolHandle::delegating(&adapter)), m(10, 5, 7, 6));

        // Two levels of delegation are not unwrapped
        let outer = Arc::new(Adapter(PoolHandle::delegating(&adapter)));
        assert_eq!(
            inspect(&PoolHandle::delegating(&outer)),
            Measurement::default()
        );
    }

    #[test]
    fn test_delegating_to_dead_pool_is_zero() {
        let pool = stealing();
        let adapter = Arc::new(Adapter(PoolHandle::work_stealing(&pool)));
        drop(pool);
        assert_eq!(
            inspect(&PoolHandle::delegating(&adapter)),
            Measurement::default()
        );
    }

    #[test]
    fn test_key_identity() {
        let a = stealing();
        let b = stealing();
        let ha = PoolHandle::work_stealing(&a);
        assert_eq!(ha.key(), ha.clone().key());
        assert_eq!(ha.key(), PoolHandle::work_stealing(&a).key());
        assert_ne!(ha.key(), PoolHandle::work_stealing(&b).key());

        // Key survives the pool
        let key = ha.key();
        drop(a);
        assert_eq!(ha.key(), key);
    }

    #[test]
    fn test_constructors_accept_concrete_pools() {
        let pool: Arc<FakeQueued> = queued();
        let adapter: Arc<Adapter> = Arc::new(Adapter(PoolHandle::queued(&pool)));

        let handles = [
            PoolHandle::queued(&pool),
            PoolHandle::opaque(&pool),
            PoolHandle::delegating(&adapter),
            PoolHandle::work_stealing(&stealing()),
        ];
        let variants: Vec<_> = handles.iter().map(PoolHandle::variant).collect();
        assert_eq!(
            variants,
            ["queued", "opaque", "delegating", "work_stealing"]
        );

        // One allocation has one key, whichever shape it is viewed through
        assert_eq!(handles[0].key(), handles[1].key());
        assert_eq!(handles[2].inspect(), m(10, 5, 7, 6));
    }
}
