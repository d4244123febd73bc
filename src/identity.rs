//! Metric identities: a name plus an ordered tag set.
//!
//! A [`MetricIdentity`] is the registry key for a recorder set. Tags are kept
//! in a `BTreeMap`, so equality and hashing never depend on the order in which
//! tags were added.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

/// Immutable key naming a metric instance.
///
/// # Example
///
/// ```
/// use loom_pool_metrics::MetricIdentity;
///
/// let a = MetricIdentity::new("loom_executor")
///     .with_tag("pool", "io")
///     .with_tag("app", "web");
/// let b = MetricIdentity::new("loom_executor")
///     .with_tag("app", "web")
///     .with_tag("pool", "io");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricIdentity {
    name: String,
    tags: BTreeMap<String, String>,
}

impl MetricIdentity {
    /// Create an identity with no tags.
    ///
    /// The name is sanitized to a valid Prometheus metric name, so names that
    /// differ only in invalid characters collide: `"my-app"` and `"my_app"`
    /// are the same identity, and registering both yields `None` for the
    /// second.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let sanitized = sanitize_metric_name(name);
        if sanitized != name {
            debug!(name, %sanitized, "metric name sanitized");
        }
        Self {
            name: sanitized,
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag, replacing any previous value for the same key.
    ///
    /// Tag keys are sanitized to valid label names, so `"pool-name"` and
    /// `"pool_name"` address the same tag. Values are kept verbatim.
    pub fn with_tag(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        let key = key.as_ref();
        let sanitized = sanitize_label_name(key);
        if sanitized != key {
            debug!(key, %sanitized, "tag key sanitized");
        }
        self.tags.insert(sanitized, value.into());
        self
    }

    /// Add several tags at once.
    pub fn with_tags<I, K, V>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        tags.into_iter().fold(self, |identity, (k, v)| identity.with_tag(k, v))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Look up a single tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=\"{}\"", k, v)?;
        }
        f.write_str("}")
    }
}

/// Sanitize a string into a valid Prometheus metric name.
///
/// Valid chars: `[a-zA-Z_:]` for the first char, `[a-zA-Z0-9_:]` for the
/// rest. Anything else becomes an underscore.
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, true)
}

/// Sanitize a string into a valid Prometheus label name (no colons).
pub fn sanitize_label_name(name: &str) -> String {
    sanitize(name, false)
}

fn sanitize(name: &str, allow_colon: bool) -> String {
    if name.is_empty() {
        return "_".to_string();
    }
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            let valid = c.is_ascii_alphabetic()
                || c == '_'
                || (allow_colon && c == ':')
                || (i > 0 && c.is_ascii_digit());
            if valid { c } else { '_' }
        })
        .collect()
}
