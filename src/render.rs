//! Prometheus text exposition of registry snapshots.
//!
//! Snapshots are converted into `prometheus` protobuf metric families and
//! encoded with the stock `TextEncoder`. Each recorder becomes one sample
//! named `{identity}_{recorder}`, labelled with the identity's tags:
//!
//! ```text
//! # HELP loom_executor_queued_tasks Tasks waiting in the pool queue
//! # TYPE loom_executor_queued_tasks gauge
//! loom_executor_queued_tasks{pool="compute"} 4
//! ```
//!
//! Rendering reads through [`MetricsRegistry::snapshot_all`], so counters and
//! histograms report the delta since the previous scrape.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use prometheus::proto::{
    Bucket, Counter, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType,
};
use prometheus::{Encoder, TextEncoder};
use tracing::warn;

use crate::error::Result;
use crate::identity::{sanitize_metric_name, MetricIdentity};
use crate::recorder::{HistogramSnapshot, RecordedValue, RecorderKind};
use crate::registry::{IdentitySnapshot, MetricsRegistry};

/// Snapshot the registry and encode it as Prometheus text.
pub fn render_text(registry: &MetricsRegistry) -> Result<String> {
    render_snapshots(&registry.snapshot_all())
}

/// Encode already-taken snapshots as Prometheus text.
pub fn render_snapshots(snapshots: &[IdentitySnapshot]) -> Result<String> {
    let families = gather(snapshots);
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Group snapshots into metric families, sorted by family name.
///
/// A recorder whose kind conflicts with an existing family of the same name
/// is skipped, and so is a sample whose family and label set were already
/// emitted by another identity (`app{pool=x}` with recorder `pool_size` and
/// `app_pool{pool=x}` with recorder `size` both map to `app_pool_size`).
pub fn gather(snapshots: &[IdentitySnapshot]) -> Vec<MetricFamily> {
    let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();
    let mut emitted: HashSet<(String, &BTreeMap<String, String>)> = HashSet::new();

    for snapshot in snapshots {
        for recorder in &snapshot.recorders {
            let name = family_name(&snapshot.identity, &recorder.name);
            let field_type = metric_type(recorder.value.kind());

            let family = match families.entry(name.clone()) {
                Entry::Vacant(slot) => {
                    let mut family = MetricFamily::default();
                    family.set_name(slot.key().clone());
                    family.set_help(recorder.help.to_string());
                    family.set_field_type(field_type);
                    slot.insert(family)
                }
                Entry::Occupied(slot) => {
                    if slot.get().get_field_type() != field_type {
                        warn!(
                            family = %slot.key(),
                            identity = %snapshot.identity,
                            "metric kind conflicts with existing family, skipping"
                        );
                        continue;
                    }
                    slot.into_mut()
                }
            };

            if !emitted.insert((name, snapshot.identity.tags())) {
                warn!(
                    family = %family.get_name(),
                    identity = %snapshot.identity,
                    "duplicate series for metric family, skipping"
                );
                continue;
            }

            family
                .mut_metric()
                .push(to_metric(&snapshot.identity, &recorder.value));
        }
    }

    families.into_values().collect()
}

fn family_name(identity: &MetricIdentity, recorder: &str) -> String {
    if recorder.is_empty() {
        identity.name().to_string()
    } else {
        format!("{}_{}", identity.name(), sanitize_metric_name(recorder))
    }
}

fn metric_type(kind: RecorderKind) -> MetricType {
    match kind {
        RecorderKind::Counter => MetricType::COUNTER,
        RecorderKind::Gauge => MetricType::GAUGE,
        RecorderKind::Histogram => MetricType::HISTOGRAM,
    }
}

fn to_metric(identity: &MetricIdentity, value: &RecordedValue) -> Metric {
    let mut metric = Metric::default();
    for (k, v) in identity.tags() {
        let mut label = LabelPair::default();
        label.set_name(k.clone());
        label.set_value(v.clone());
        metric.mut_label().push(label);
    }

    match value {
        RecordedValue::Counter(v) => {
            let mut counter = Counter::default();
            counter.set_value(*v as f64);
            metric.set_counter(counter);
        }
        RecordedValue::Gauge(v) => {
            let mut gauge = Gauge::default();
            gauge.set_value(*v as f64);
            metric.set_gauge(gauge);
        }
        RecordedValue::Histogram(h) => metric.set_histogram(to_histogram(h)),
    }
    metric
}

fn to_histogram(snapshot: &HistogramSnapshot) -> Histogram {
    let mut histogram = Histogram::default();
    histogram.set_sample_count(snapshot.count);
    histogram.set_sample_sum(snapshot.sum as f64);
    for (upper_bound, cumulative) in &snapshot.buckets {
        let mut bucket = Bucket::default();
        bucket.set_upper_bound(*upper_bound);
        bucket.set_cumulative_count(*cumulative);
        histogram.mut_bucket().push(bucket);
    }
    histogram
}
