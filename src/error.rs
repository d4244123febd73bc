//! Error types for loom-pool-metrics.
//!
//! Instrumentation itself never fails: duplicate registrations, unknown pool
//! variants and stale handles all degrade to `None` or zero values. Errors
//! only surface at the configuration, rendering and task-submission
//! boundaries.

use thiserror::Error;

/// Errors returned by the builder, the renderer and the instrumented pools.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Error extracting configuration from figment.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The sampling interval must be non-zero.
    #[error("sample interval must be greater than zero")]
    InvalidInterval,

    /// Error encoding metric families to the text exposition format.
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    /// The encoder produced bytes that are not valid UTF-8.
    #[error("encoded metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Error building the rayon thread pool backing a work-stealing pool.
    #[error("failed to build rayon thread pool: {0}")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),

    /// Error spawning a worker thread for a fixed pool.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// A task was submitted after the pool was shut down.
    #[error("pool '{0}' has been shut down")]
    PoolShutdown(String),

    /// A bounded pool queue is full.
    #[error("queue of pool '{pool}' is full ({capacity} tasks)")]
    QueueFull { pool: String, capacity: usize },
}

/// Result type alias for loom-pool-metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
