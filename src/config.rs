//! Configuration types for pool metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default sampling interval in milliseconds.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Configuration for pool metrics collection.
///
/// This struct can be deserialized from TOML, YAML, JSON, or environment variables
/// using figment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Metric name prefix (default: "loom"). Pool metrics are named
    /// `{prefix}_executor_{field}`.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Interval between pool samples in milliseconds (default: 1000)
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Tag key carrying the pool id (default: "pool")
    #[serde(default = "default_pool_tag")]
    pub pool_tag: String,

    /// Tags attached to every pool metric
    #[serde(default)]
    pub const_tags: BTreeMap<String, String>,
}

fn default_prefix() -> String {
    "loom".to_string()
}

fn default_sample_interval_ms() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_MS
}

fn default_pool_tag() -> String {
    "pool".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            sample_interval_ms: default_sample_interval_ms(),
            pool_tag: default_pool_tag(),
            const_tags: BTreeMap::new(),
        }
    }
}

impl MetricsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sampling interval as a `Duration`.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
