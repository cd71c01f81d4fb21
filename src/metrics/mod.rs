//! Metrics emission boundary
//!
//! Every component keeps its own lock-free counters and exposes a read-only
//! snapshot. Snapshots are pushed to an external observability collaborator
//! through the [`MetricsSink`] trait as `(name, value, tags)` triples.

mod sink;

pub use sink::{MetricsSink, NoopSink, RecordedMetric, RecordingSink, Tags, TracingSink};

/// A snapshot that can be pushed to a [`MetricsSink`]
pub trait EmitMetrics {
    /// Emit every value of this snapshot into `sink`
    fn emit(&self, sink: &dyn MetricsSink);
}
