//! Lock-free counters for asynchronous operations

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::semaphore::SemaphoreStats;
use crate::metrics::{EmitMetrics, MetricsSink};

/// Process-wide async operation counters
///
/// All counters are monotonic except `concurrent_operations`, which is a
/// gauge whose running maximum is kept in `max_concurrent_operations`.
#[derive(Debug, Default)]
pub struct AsyncMetrics {
    total_operations: AtomicU64,
    concurrent_operations: AtomicUsize,
    max_concurrent_operations: AtomicUsize,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl AsyncMetrics {
    /// Create a zeroed metrics instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of an operation
    ///
    /// The returned guard decrements the concurrent gauge when dropped. A
    /// guard dropped without [`OperationGuard::finish`] counts as a
    /// cancellation.
    pub fn begin(&self) -> OperationGuard<'_> {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        let current = self.concurrent_operations.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_concurrent_operations
            .fetch_max(current, Ordering::AcqRel);
        OperationGuard {
            metrics: self,
            finished: false,
        }
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn concurrent_operations(&self) -> usize {
        self.concurrent_operations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn max_concurrent_operations(&self) -> usize {
        self.max_concurrent_operations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// RAII marker for one in-flight operation
#[must_use = "dropping the guard immediately ends the operation"]
#[derive(Debug)]
pub struct OperationGuard<'a> {
    metrics: &'a AsyncMetrics,
    finished: bool,
}

impl OperationGuard<'_> {
    /// Mark the operation as completed (successfully or not)
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.metrics
            .concurrent_operations
            .fetch_sub(1, Ordering::AcqRel);
        if !self.finished {
            self.metrics.cancellations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Read-only copy of the controller's counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsyncMetricsSnapshot {
    pub total_operations: u64,
    pub concurrent_operations: usize,
    pub max_concurrent_operations: usize,
    pub timeouts: u64,
    pub cancellations: u64,
    pub retries: u64,
    pub failures: u64,
    pub semaphores: Vec<SemaphoreStats>,
}

impl AsyncMetricsSnapshot {
    pub(crate) fn capture(metrics: &AsyncMetrics, semaphores: Vec<SemaphoreStats>) -> Self {
        Self {
            total_operations: metrics.total_operations(),
            concurrent_operations: metrics.concurrent_operations(),
            max_concurrent_operations: metrics.max_concurrent_operations(),
            timeouts: metrics.timeouts(),
            cancellations: metrics.cancellations(),
            retries: metrics.retries(),
            failures: metrics.failures(),
            semaphores,
        }
    }
}

impl EmitMetrics for AsyncMetricsSnapshot {
    fn emit(&self, sink: &dyn MetricsSink) {
        sink.record("async.total_operations", self.total_operations as f64, &[]);
        sink.record(
            "async.concurrent_operations",
            self.concurrent_operations as f64,
            &[],
        );
        sink.record(
            "async.max_concurrent_operations",
            self.max_concurrent_operations as f64,
            &[],
        );
        sink.record("async.timeouts", self.timeouts as f64, &[]);
        sink.record("async.cancellations", self.cancellations as f64, &[]);
        sink.record("async.retries", self.retries as f64, &[]);
        sink.record("async.failures", self.failures as f64, &[]);

        for sem in &self.semaphores {
            let tags = [("semaphore", sem.name.as_str())];
            sink.record("semaphore.limit", sem.limit as f64, &tags);
            sink.record("semaphore.in_use", sem.in_use as f64, &tags);
            sink.record("semaphore.waits", sem.waits as f64, &tags);
            sink.record("semaphore.utilization", sem.utilization(), &tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;

    #[test]
    fn test_guard_tracks_concurrency_and_max() {
        let metrics = AsyncMetrics::new();
        let a = metrics.begin();
        let b = metrics.begin();
        assert_eq!(metrics.concurrent_operations(), 2);
        a.finish();
        assert_eq!(metrics.concurrent_operations(), 1);
        b.finish();

        assert_eq!(metrics.concurrent_operations(), 0);
        assert_eq!(metrics.max_concurrent_operations(), 2);
        assert_eq!(metrics.total_operations(), 2);
        assert_eq!(metrics.cancellations(), 0);
    }

    #[test]
    fn test_dropped_guard_counts_cancellation() {
        let metrics = AsyncMetrics::new();
        drop(metrics.begin());
        assert_eq!(metrics.cancellations(), 1);
        assert_eq!(metrics.concurrent_operations(), 0);
    }

    #[test]
    fn test_snapshot_emits_counters() {
        let metrics = AsyncMetrics::new();
        metrics.record_timeout();
        metrics.record_retry();
        metrics.record_retry();
        metrics.record_failure();

        let snapshot = AsyncMetricsSnapshot::capture(&metrics, Vec::new());
        assert_eq!(snapshot.retries, 2);

        let sink = RecordingSink::new();
        snapshot.emit(&sink);
        assert_eq!(sink.last_value("async.timeouts"), Some(1.0));
        assert_eq!(sink.last_value("async.retries"), Some(2.0));
        assert_eq!(sink.last_value("async.failures"), Some(1.0));
    }
}
