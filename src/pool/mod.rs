//! Instrumented executor pools.
//!
//! Both pools announce themselves to an optional [`PoolLifecycleListener`]
//! when built and when shut down, and expose their statistics from atomics
//! so the sampler never contends with task dispatch.
//!
//! | Pool | Backed by | Inspected as |
//! |------|-----------|--------------|
//! | [`WorkStealingPool`] | `rayon::ThreadPool` | `PoolHandle::WorkStealing` |
//! | [`FixedThreadPool`] | named std threads + shared queue | `PoolHandle::Queued` |
//!
//! Thread naming:
//! - Work-stealing threads: `{name}-steal-0000`, `{name}-steal-0001`, ...
//! - Fixed pool threads: `{name}-fixed-0000`, `{name}-fixed-0001`, ...

mod fixed;
mod work_stealing;

pub use fixed::{FixedThreadPool, FixedThreadPoolBuilder};
pub use work_stealing::{WorkStealingPool, WorkStealingPoolBuilder};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::inspector::PoolHandle;
use crate::tracker::PoolLifecycleListener;

/// Creation/shutdown notification shared by the pool implementations.
///
/// Guarantees the shutdown event is delivered at most once.
pub(crate) struct LifecycleHooks {
    listener: Option<Arc<dyn PoolLifecycleListener>>,
    shut_down: AtomicBool,
}

impl LifecycleHooks {
    pub(crate) fn new(listener: Option<Arc<dyn PoolLifecycleListener>>) -> Self {
        Self {
            listener,
            shut_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn created(&self, pool_id: &str, handle: PoolHandle) {
        info!(pool_id, variant = handle.variant(), "pool created");
        if let Some(ref listener) = self.listener {
            listener.on_pool_created(pool_id, handle);
        }
    }

    /// Returns `true` the first time it is called.
    pub(crate) fn shutdown(&self, pool_id: &str, handle: &PoolHandle) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!(pool_id, "pool shut down");
        if let Some(ref listener) = self.listener {
            listener.on_pool_shutdown(handle);
        }
        true
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
