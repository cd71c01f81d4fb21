//! Metrics sink implementations

use std::sync::Mutex;
use tracing::debug;

/// Metric tags as `(key, value)` pairs
pub type Tags<'a> = &'a [(&'a str, &'a str)];

/// Receiver of metric samples
///
/// Implementations must be cheap and non-blocking: they are called from
/// background loops and hot paths alike.
pub trait MetricsSink: Send + Sync {
    /// Record a single sample
    fn record(&self, name: &str, value: f64, tags: Tags<'_>);
}

/// Sink that writes every sample as a `debug!` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, name: &str, value: f64, tags: Tags<'_>) {
        debug!(metric = name, value, tags = ?tags, "metric");
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _name: &str, _value: f64, _tags: Tags<'_>) {}
}

/// A single sample captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

impl RecordedMetric {
    /// Get the value of a tag, if present
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that keeps every sample in memory (diagnostics and tests)
#[derive(Debug, Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<RecordedMetric>>,
}

impl RecordingSink {
    /// Create an empty recording sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded sample in arrival order
    #[must_use]
    pub fn samples(&self) -> Vec<RecordedMetric> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    /// Most recent value recorded under `name` (any tags)
    #[must_use]
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.samples
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }

    /// Most recent value recorded under `name` with a matching tag
    #[must_use]
    pub fn last_value_tagged(&self, name: &str, key: &str, value: &str) -> Option<f64> {
        self.samples
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|m| m.name == name && m.tag(key) == Some(value))
            .map(|m| m.value)
    }

    /// Drop all recorded samples
    pub fn clear(&self) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, name: &str, value: f64, tags: Tags<'_>) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(RecordedMetric {
                name: name.to_string(),
                value,
                tags: tags
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            });
        }
    }
}
