//! # loom-pool-metrics
//!
//! **Health metrics for thread pools, pulled on demand**
//!
//! Tracks executor pools from creation to shutdown, samples their maximum
//! size, active threads, queued tasks and current size on a fixed interval,
//! and renders the result in the Prometheus text exposition format.
//!
//! ## Features
//!
//! - **Lifecycle Tracking**: Pools announce creation and shutdown through
//!   [`PoolLifecycleListener`]; the tracker registers and retires metrics to match
//! - **Lock-free Inspection**: Pool statistics come from atomics, never from the
//!   locks used to dispatch tasks
//! - **Pull-based Registry**: [`MetricsRegistry::snapshot_all`] gives a sorted,
//!   per-recorder-atomic view for scrapers
//! - **Instrumented Pools**: A rayon-backed [`WorkStealingPool`] and a
//!   [`FixedThreadPool`] with a shared queue
//! - **Flexible Configuration**: Configure via files (TOML/YAML/JSON), environment
//!   variables, code, or clap CLI arguments
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use loom_pool_metrics::{MetricsBuilder, WorkStealingPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = Arc::new(
//!         MetricsBuilder::new()
//!             .prefix("myapp")
//!             .sample_interval_ms(500)
//!             .build(tokio::runtime::Handle::current())?,
//!     );
//!
//!     let pool = WorkStealingPool::builder("compute")
//!         .threads(4)
//!         .listener(tracker.clone())
//!         .build()?;
//!     pool.spawn(|| { /* CPU-bound work */ })?;
//!
//!     // Serve this from your scrape endpoint
//!     println!("{}", tracker.render()?);
//!
//!     pool.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Exposed Metrics
//!
//! All gauges, labelled with `pool="<id>"` plus any configured constant tags:
//!
//! - `{prefix}_executor_max_pool_size` - Maximum pool size (parallelism for work-stealing pools)
//! - `{prefix}_executor_active_threads` - Threads currently executing tasks
//! - `{prefix}_executor_queued_tasks` - Tasks waiting in the pool queue
//! - `{prefix}_executor_pool_size` - Current number of pool threads
//!
//! ## Configuration
//!
//! Configuration sources are merged in order (later sources override earlier):
//!
//! 1. Default values
//! 2. Config files (via `.file()`)
//! 3. Environment variables (via `.env_prefix()`)
//! 4. Programmatic overrides
//! 5. CLI arguments (via `.with_cli_args()`)
//!
//! ```toml
//! prefix = "myapp"
//! sample_interval_ms = 500
//! pool_tag = "pool"
//!
//! [const_tags]
//! region = "eu-west"
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod identity;
pub mod inspector;
pub mod pool;
pub mod recorder;
pub mod registry;
pub mod render;
pub mod sampler;
pub mod tracker;

pub use builder::{MetricsArgs, MetricsBuilder};
pub use config::MetricsConfig;
pub use error::{MetricsError, Result};
pub use identity::MetricIdentity;
pub use inspector::{
    inspect, DelegatingPool, Measurement, PoolHandle, PoolKey, QueuedPoolStats,
    WorkStealingStats,
};
pub use pool::{FixedThreadPool, WorkStealingPool};
pub use recorder::{MetricRecorder, PoolRecorders, RecordedValue, RecorderKind, RecorderSet};
pub use registry::{IdentitySnapshot, MetricsRegistry};
pub use render::render_text;
pub use sampler::{PeriodicSampler, SamplerHandle};
pub use tracker::{PoolLifecycleListener, PoolLifecycleTracker};
