//! Process-wide registry of recorder sets.
//!
//! # Architecture
//!
//! ```text
//! MetricsRegistry
//!   └── RwLock<HashMap<MetricIdentity, Arc<dyn RecorderSet>>>
//!         ├── PoolRecorders     (one per tracked pool)
//!         └── MetricRecorder    (generic single recorders)
//! ```
//!
//! Registration rejects duplicates instead of overwriting, so a repeated
//! pool-creation event can never replace a live recorder set. Snapshots clone
//! the entry `Arc`s under the read lock and read the recorders after the lock
//! is released, so scrapes never hold up registration for longer than a map
//! walk.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::identity::MetricIdentity;
use crate::recorder::{MetricRecorder, RecorderSet, RecorderSnapshot};

/// Snapshot of every recorder registered under one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySnapshot {
    pub identity: MetricIdentity,
    pub recorders: Vec<RecorderSnapshot>,
}

/// Concurrent map from [`MetricIdentity`] to recorder set.
#[derive(Default)]
pub struct MetricsRegistry {
    entries: RwLock<HashMap<MetricIdentity, Arc<dyn RecorderSet>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recorder set built by `factory`.
    ///
    /// Returns `None` if `identity` is already registered; the existing set
    /// is left untouched and `factory` is not called.
    pub fn register<S, F>(&self, identity: MetricIdentity, factory: F) -> Option<Arc<S>>
    where
        S: RecorderSet + 'static,
        F: FnOnce() -> S,
    {
        // Fast path: read lock
        if self.entries.read().contains_key(&identity) {
            debug!(%identity, "duplicate registration rejected");
            return None;
        }

        // Slow path: write lock, double-check
        let mut entries = self.entries.write();
        if entries.contains_key(&identity) {
            debug!(%identity, "duplicate registration rejected");
            return None;
        }

        let set = Arc::new(factory());
        entries.insert(identity, set.clone() as Arc<dyn RecorderSet>);
        Some(set)
    }

    /// Register a single recorder under `identity`.
    ///
    /// Same duplicate policy as [`register`](Self::register).
    pub fn register_recorder(
        &self,
        identity: MetricIdentity,
        recorder: MetricRecorder,
    ) -> Option<Arc<MetricRecorder>> {
        self.register(identity, move || recorder)
    }

    /// Remove the entry for `identity`.
    ///
    /// Returns `false` if nothing was registered; that is not an error.
    pub fn unregister(&self, identity: &MetricIdentity) -> bool {
        let removed = self.entries.write().remove(identity).is_some();
        if removed {
            debug!(%identity, "unregistered recorder set");
        }
        removed
    }

    pub fn contains(&self, identity: &MetricIdentity) -> bool {
        self.entries.read().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All registered identities, sorted.
    pub fn identities(&self) -> Vec<MetricIdentity> {
        let mut ids: Vec<_> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot every registered recorder set, ordered by identity.
    ///
    /// Each recorder snapshot is atomic on its own; the registry-wide view is
    /// not one global transaction.
    pub fn snapshot_all(&self) -> Vec<IdentitySnapshot> {
        let mut live: Vec<(MetricIdentity, Arc<dyn RecorderSet>)> = self
            .entries
            .read()
            .iter()
            .map(|(id, set)| (id.clone(), Arc::clone(set)))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));

        live.into_iter()
            .map(|(identity, set)| IdentitySnapshot {
                identity,
                recorders: set.collect(),
            })
            .collect()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{PoolRecorders, RecordedValue};

    fn pool_id(name: &str) -> MetricIdentity {
        MetricIdentity::new("loom_executor").with_tag("pool", name)
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_empty());

        let set = registry.register(pool_id("a"), PoolRecorders::new);
        assert!(set.is_some());
        assert!(registry.contains(&pool_id("a")));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&pool_id("a")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let registry = MetricsRegistry::new();

        let first = registry
            .register(pool_id("a"), PoolRecorders::new)
            .expect("first registration should succeed");
        first.active_threads.record(7);

        let mut called = false;
        let second = registry.register(pool_id("a"), || {
            called = true;
            PoolRecorders::new()
        });
        assert!(second.is_none());
        assert!(!called);
        assert_eq!(registry.len(), 1);

        // The registered set is still the first one
        let snap = registry.snapshot_all();
        let active = snap[0]
            .recorders
            .iter()
            .find(|r| &*r.name == "active_threads")
            .unwrap();
        assert_eq!(active.value, RecordedValue::Gauge(7));
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = MetricsRegistry::new();
        registry.register(pool_id("a"), PoolRecorders::new);

        assert!(!registry.unregister(&pool_id("missing")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_after_unregister() {
        let registry = MetricsRegistry::new();
        let first = registry.register(pool_id("a"), PoolRecorders::new).unwrap();
        registry.unregister(&pool_id("a"));

        let second = registry.register(pool_id("a"), PoolRecorders::new).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_snapshot_after_register_is_zero() {
        let registry = MetricsRegistry::new();
        registry.register(pool_id("a"), PoolRecorders::new);

        let snap = registry.snapshot_all();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].identity, pool_id("a"));
        assert_eq!(snap[0].recorders.len(), 4);
        assert!(snap[0]
            .recorders
            .iter()
            .all(|r| r.value == RecordedValue::Gauge(0)));
    }

    #[test]
    fn test_snapshot_ordered_by_identity() {
        let registry = MetricsRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(pool_id(name), PoolRecorders::new);
        }
        registry.register_recorder(
            MetricIdentity::new("aaa"),
            MetricRecorder::counter("events", "Events"),
        );

        let ids: Vec<_> = registry
            .snapshot_all()
            .into_iter()
            .map(|s| s.identity)
            .collect();
        assert_eq!(
            ids,
            vec![
                MetricIdentity::new("aaa"),
                pool_id("a"),
                pool_id("b"),
                pool_id("c")
            ]
        );
        assert_eq!(registry.identities(), ids);
    }

    #[test]
    fn test_counter_delta_through_registry() {
        let registry = MetricsRegistry::new();
        let counter = registry
            .register_recorder(
                MetricIdentity::new("loom_pool"),
                MetricRecorder::counter("events", "Events"),
            )
            .unwrap();

        counter.record(4);
        let first = registry.snapshot_all();
        assert_eq!(first[0].recorders[0].value, RecordedValue::Counter(4));

        let second = registry.snapshot_all();
        assert_eq!(second[0].recorders[0].value, RecordedValue::Counter(0));
    }

    #[test]
    fn test_registry_concurrent_access() {
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for t in 0..4 {
            let reg = registry.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let id = pool_id(&format!("{}-{}", t, i));
                    assert!(reg.register(id.clone(), PoolRecorders::new).is_some());
                    let _ = reg.snapshot_all();
                    assert!(reg.unregister(&id));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
