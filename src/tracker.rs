//! Pool lifecycle tracking.
//!
//! The tracker subscribes to pool creation and shutdown events through
//! [`PoolLifecycleListener`] and keeps a side table of everything it owns per
//! pool:
//!
//! ```text
//! PoolLifecycleTracker
//!   └── Mutex<SideTable>
//!         ├── by_key: HashMap<PoolKey, TrackedPool>
//!         │     └── TrackedPool { identity, handle, recorders, sampler }
//!         └── by_identity: HashMap<MetricIdentity, PoolKey>
//! ```
//!
//! Per-pool states are `Untracked → Tracked → Stopped`. A stopped pool id that
//! shows up again starts a fresh cycle with a new recorder set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::MetricsConfig;
use crate::error::{MetricsError, Result};
use crate::identity::MetricIdentity;
use crate::inspector::{PoolHandle, PoolKey};
use crate::recorder::PoolRecorders;
use crate::registry::MetricsRegistry;
use crate::render;
use crate::sampler::{PeriodicSampler, SamplerHandle};

/// Receiver of pool lifecycle events.
///
/// Pools call `on_pool_created` once per pool instance and
/// `on_pool_shutdown` at most once, after the creation event. Implementations
/// must be cheap: they run on the thread that creates or shuts down the pool.
pub trait PoolLifecycleListener: Send + Sync {
    fn on_pool_created(&self, pool_id: &str, pool: PoolHandle);
    fn on_pool_shutdown(&self, pool: &PoolHandle);
}

struct TrackedPool {
    pool_id: String,
    identity: MetricIdentity,
    handle: PoolHandle,
    recorders: Arc<PoolRecorders>,
    sampler: SamplerHandle,
}

/// Tracked pools keyed by allocation, plus an index from identity to the
/// pool that currently owns it. Both maps change together under one lock.
#[derive(Default)]
struct SideTable {
    by_key: HashMap<PoolKey, TrackedPool>,
    by_identity: HashMap<MetricIdentity, PoolKey>,
}

impl SideTable {
    fn insert(&mut self, key: PoolKey, pool: TrackedPool) {
        self.by_identity.insert(pool.identity.clone(), key);
        self.by_key.insert(key, pool);
    }

    fn remove(&mut self, key: &PoolKey) -> Option<TrackedPool> {
        let pool = self.by_key.remove(key)?;
        if self.by_identity.get(&pool.identity) == Some(key) {
            self.by_identity.remove(&pool.identity);
        }
        Some(pool)
    }

    /// Entry owning `identity` whose pool was dropped without a shutdown event.
    fn take_stale(&mut self, identity: &MetricIdentity) -> Option<TrackedPool> {
        let key = *self.by_identity.get(identity)?;
        match self.by_key.get(&key) {
            Some(pool) if !pool.handle.is_alive() => self.remove(&key),
            _ => None,
        }
    }

    fn drain(&mut self) -> Vec<TrackedPool> {
        self.by_identity.clear();
        self.by_key.drain().map(|(_, p)| p).collect()
    }
}

/// Registers a recorder set and a sampler for each live pool.
pub struct PoolLifecycleTracker {
    registry: Arc<MetricsRegistry>,
    runtime: tokio::runtime::Handle,
    interval: Duration,
    metric_name: String,
    pool_tag: String,
    const_tags: BTreeMap<String, String>,
    pools: Mutex<SideTable>,
}

impl PoolLifecycleTracker {
    /// Create a tracker. The sampling interval is read from `config` once.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidInterval`] if the interval is zero.
    pub fn new(
        config: &MetricsConfig,
        registry: Arc<MetricsRegistry>,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self> {
        let interval = config.sample_interval();
        if interval.is_zero() {
            return Err(MetricsError::InvalidInterval);
        }

        info!(
            prefix = %config.prefix,
            interval_ms = config.sample_interval_ms,
            "building pool lifecycle tracker"
        );

        Ok(Self {
            registry,
            runtime,
            interval,
            metric_name: format!("{}_executor", config.prefix),
            pool_tag: config.pool_tag.clone(),
            const_tags: config.const_tags.clone(),
            pools: Mutex::new(SideTable::default()),
        })
    }

    /// Identity under which the recorders of `pool_id` are registered.
    pub fn identity_for(&self, pool_id: &str) -> MetricIdentity {
        MetricIdentity::new(&self.metric_name)
            .with_tags(&self.const_tags)
            .with_tag(&self.pool_tag, pool_id)
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        render::render_text(&self.registry)
    }

    /// Ids of all pools currently tracked, sorted.
    pub fn tracked_pools(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .pools
            .lock()
            .by_key
            .values()
            .map(|p| p.pool_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_tracked(&self, pool: &PoolHandle) -> bool {
        self.pools.lock().by_key.contains_key(&pool.key())
    }

    /// Recorder set of a tracked pool.
    pub fn recorders(&self, pool: &PoolHandle) -> Option<Arc<PoolRecorders>> {
        self.pools
            .lock()
            .by_key
            .get(&pool.key())
            .map(|p| Arc::clone(&p.recorders))
    }

    /// Stop tracking pools that were dropped without a shutdown event.
    ///
    /// Returns the number of entries retired.
    pub fn prune(&self) -> usize {
        let dead: Vec<TrackedPool> = {
            let mut pools = self.pools.lock();
            let keys: Vec<PoolKey> = pools
                .by_key
                .iter()
                .filter(|(_, p)| !p.handle.is_alive())
                .map(|(k, _)| *k)
                .collect();
            keys.iter().filter_map(|k| pools.remove(k)).collect()
        };

        let count = dead.len();
        for pool in dead {
            warn!(pool_id = %pool.pool_id, "pool dropped without shutdown, retiring metrics");
            self.retire(pool);
        }
        count
    }

    /// Stop every sampler and unregister every recorder set this tracker owns.
    pub fn shutdown_all(&self) {
        let all = self.pools.lock().drain();
        for pool in all {
            self.retire(pool);
        }
    }

    fn retire(&self, pool: TrackedPool) {
        // Stop sampling before the recorder set leaves the registry
        pool.sampler.cancel();
        self.registry.unregister(&pool.identity);
        debug!(pool_id = %pool.pool_id, identity = %pool.identity, "pool untracked");
    }
}

impl PoolLifecycleListener for PoolLifecycleTracker {
    fn on_pool_created(&self, pool_id: &str, pool: PoolHandle) {
        let key = pool.key();
        let mut pools = self.pools.lock();
        if pools.by_key.contains_key(&key) {
            debug!(pool_id, "creation event for already tracked pool ignored");
            return;
        }

        let identity = self.identity_for(pool_id);
        if let Some(stale) = pools.take_stale(&identity) {
            warn!(pool_id, "retiring stale pool that was never shut down");
            self.retire(stale);
        }

        let Some(recorders) = self.registry.register(identity.clone(), PoolRecorders::new) else {
            debug!(pool_id, %identity, "pool metrics already registered, not sampling");
            return;
        };

        let sampler = PeriodicSampler::spawn(
            &self.runtime,
            self.interval,
            pool.clone(),
            recorders.clone(),
        );
        debug!(pool_id, variant = pool.variant(), %identity, "pool tracked");

        pools.insert(
            key,
            TrackedPool {
                pool_id: pool_id.to_string(),
                identity,
                handle: pool,
                recorders,
                sampler,
            },
        );
    }

    fn on_pool_shutdown(&self, pool: &PoolHandle) {
        let tracked = self.pools.lock().remove(&pool.key());
        match tracked {
            Some(tracked) => self.retire(tracked),
            None => debug!(pool = ?pool, "shutdown event for untracked pool ignored"),
        }
    }
}

impl Drop for PoolLifecycleTracker {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

impl std::fmt::Debug for PoolLifecycleTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLifecycleTracker")
            .field("metric_name", &self.metric_name)
            .field("interval", &self.interval)
            .field("tracked", &self.pools.lock().by_key.len())
            .finish_non_exhaustive()
    }
}
