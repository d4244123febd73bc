//! Builder for constructing a pool lifecycle tracker.
//!
//! The builder supports multiple configuration sources using figment:
//! - Default values
//! - Config files (TOML, YAML, JSON)
//! - Environment variables
//! - Programmatic overrides
//! - CLI arguments via clap

use std::path::Path;
use std::sync::Arc;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;

use crate::config::MetricsConfig;
use crate::error::Result;
use crate::registry::MetricsRegistry;
use crate::tracker::PoolLifecycleTracker;

/// Builder for constructing a [`PoolLifecycleTracker`].
///
/// Configuration sources are merged in the following order (later sources override earlier):
/// 1. Default values
/// 2. Config files (in order added)
/// 3. Environment variables
/// 4. Programmatic overrides
///
/// # Examples
///
/// ```ignore
/// use loom_pool_metrics::MetricsBuilder;
///
/// let tracker = MetricsBuilder::new()
///     .file("metrics.toml")
///     .env_prefix("POOLMETRICS")
///     .prefix("myapp")
///     .sample_interval_ms(500)
///     .build(tokio::runtime::Handle::current())?;
/// ```
pub struct MetricsBuilder {
    figment: Figment,
    registry: Option<Arc<MetricsRegistry>>,
}

impl Default for MetricsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsBuilder")
            .field("figment", &self.figment)
            .field(
                "registry",
                &self.registry.as_ref().map(|_| "<MetricsRegistry>"),
            )
            .finish()
    }
}

impl MetricsBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(MetricsConfig::default())),
            registry: None,
        }
    }

    /// Add a configuration file.
    ///
    /// Supports TOML, YAML, and JSON formats (detected by extension).
    /// Files are merged in the order they are added.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        self.figment = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => self.figment.merge(Yaml::file(path)),
            "json" => self.figment.merge(Json::file(path)),
            // Default to TOML
            _ => self.figment.merge(Toml::file(path)),
        };
        self
    }

    /// Add environment variables with a prefix.
    ///
    /// Environment variables are expected in the format `{PREFIX}_{KEY}`,
    /// e.g. `POOLMETRICS_SAMPLE_INTERVAL_MS`.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.figment = self
            .figment
            .merge(Env::prefixed(&format!("{}_", prefix)));
        self
    }

    /// Set the metric name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("prefix", prefix.into()));
        self
    }

    /// Set the sampling interval in milliseconds.
    pub fn sample_interval_ms(mut self, ms: u64) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("sample_interval_ms", ms));
        self
    }

    /// Set the tag key that carries the pool id.
    pub fn pool_tag(mut self, tag: impl Into<String>) -> Self {
        self.figment = self
            .figment
            .merge(Serialized::default("pool_tag", tag.into()));
        self
    }

    /// Add a tag attached to every pool metric.
    pub fn const_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.figment = self.figment.merge(Serialized::default(
            &format!("const_tags.{}", key),
            value.into(),
        ));
        self
    }

    /// Use an existing registry instead of creating a new one.
    ///
    /// Lets several trackers, or a tracker and hand-registered recorders,
    /// share one scrape target.
    pub fn registry(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Apply CLI argument overrides.
    ///
    /// This method applies any non-None values from the `MetricsArgs` struct.
    pub fn with_cli_args(mut self, args: &MetricsArgs) -> Self {
        if let Some(ref prefix) = args.metrics_prefix {
            self.figment = self
                .figment
                .merge(Serialized::default("prefix", prefix.clone()));
        }
        if let Some(ms) = args.metrics_sample_interval_ms {
            self.figment = self
                .figment
                .merge(Serialized::default("sample_interval_ms", ms));
        }
        self
    }

    /// Extract the merged configuration without building a tracker.
    pub fn config(&self) -> Result<MetricsConfig> {
        let config: MetricsConfig = self.figment.extract().map_err(Box::new)?;
        Ok(config)
    }

    /// Build the tracker. Samplers are spawned on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration extraction fails
    /// - The sampling interval is zero
    pub fn build(self, runtime: tokio::runtime::Handle) -> Result<PoolLifecycleTracker> {
        let config = self.config()?;
        let registry = self.registry.unwrap_or_default();
        PoolLifecycleTracker::new(&config, registry, runtime)
    }
}

/// CLI arguments for metrics configuration.
///
/// Use with clap's `Parser` derive macro and apply with
/// [`MetricsBuilder::with_cli_args`].
///
/// # Examples
///
/// ```ignore
/// use clap::Parser;
/// use loom_pool_metrics::{MetricsArgs, MetricsBuilder};
///
/// #[derive(Parser)]
/// struct MyArgs {
///     #[command(flatten)]
///     metrics: MetricsArgs,
/// }
///
/// let args = MyArgs::parse();
/// let tracker = MetricsBuilder::new()
///     .with_cli_args(&args.metrics)
///     .build(handle)?;
/// ```
#[derive(Debug, Default, Clone, clap::Args)]
pub struct MetricsArgs {
    /// Metric name prefix
    #[arg(long)]
    pub metrics_prefix: Option<String>,

    /// Pool sampling interval in milliseconds
    #[arg(long)]
    pub metrics_sample_interval_ms: Option<u64>,
}
