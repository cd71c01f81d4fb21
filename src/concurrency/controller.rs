//! Concurrency controller
//!
//! Wraps arbitrary async work with named semaphores, deadlines, retries and
//! bounded fan-out while keeping process-wide operation counters.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::error::ConcurrencyError;
use super::metrics::{AsyncMetrics, AsyncMetricsSnapshot};
use super::retry::{RetryPolicy, retry_with_backoff};
use super::semaphore::{SemaphoreRegistry, SemaphoreStats};
use crate::config::ConcurrencyConfig;
use crate::constants::concurrency::DEFAULT_CHUNK_SIZE;

/// Throttling, retry and fan-out for async operations
///
/// Cheap to clone; clones share semaphores and metrics.
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    inner: Arc<ControllerInner>,
}

#[derive(Debug)]
struct ControllerInner {
    semaphores: SemaphoreRegistry,
    metrics: AsyncMetrics,
    retry_base_delay: Duration,
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new(&ConcurrencyConfig::default())
    }
}

impl ConcurrencyController {
    #[must_use]
    pub fn new(config: &ConcurrencyConfig) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                semaphores: SemaphoreRegistry::new(config.default_semaphore_limit),
                metrics: AsyncMetrics::new(),
                retry_base_delay: config.retry_base_delay,
            }),
        }
    }

    /// Live counters (prefer [`Self::metrics_snapshot`] for reporting)
    #[must_use]
    pub fn metrics(&self) -> &AsyncMetrics {
        &self.inner.metrics
    }

    /// Run `fut` while holding a permit of the named semaphore
    ///
    /// The semaphore is created with `limit` on first use. The permit is
    /// released when `fut` completes or is dropped.
    pub async fn run_bounded<F, T>(
        &self,
        name: &str,
        limit: usize,
        fut: F,
    ) -> Result<T, ConcurrencyError>
    where
        F: Future<Output = T>,
    {
        let semaphore = self.inner.semaphores.get_or_create(name, Some(limit));
        let _permit = semaphore.acquire().await?;
        Ok(self.track(fut).await)
    }

    /// Run `fut` with a deadline, dropping it if the deadline passes
    pub async fn with_timeout<F, T>(&self, fut: F, timeout: Duration) -> Result<T, ConcurrencyError>
    where
        F: Future<Output = T>,
    {
        let guard = self.inner.metrics.begin();
        match tokio::time::timeout(timeout, fut).await {
            Ok(value) => {
                guard.finish();
                Ok(value)
            }
            Err(_) => {
                guard.finish();
                self.inner.metrics.record_timeout();
                debug!(timeout_ms = timeout.as_millis() as u64, "Operation timed out");
                Err(ConcurrencyError::Timeout { after: timeout })
            }
        }
    }

    /// Retry `op` according to `policy`
    pub async fn with_retry<F, Fut, T, E>(
        &self,
        op: F,
        policy: &RetryPolicy,
    ) -> Result<T, ConcurrencyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        retry_with_backoff(policy, &self.inner.metrics, op).await
    }

    /// Retry `op` up to `max_attempts` times with an optional per-attempt deadline
    ///
    /// Uses the configured base delay and retries timed-out attempts.
    pub async fn with_retry_simple<F, Fut, T, E>(
        &self,
        op: F,
        max_attempts: u32,
        timeout: Option<Duration>,
    ) -> Result<T, ConcurrencyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let mut policy = RetryPolicy::new(max_attempts).with_base_delay(self.inner.retry_base_delay);
        policy.timeout = timeout;
        self.with_retry(op, &policy).await
    }

    /// Run every task with at most `limit` in flight, collecting all outputs
    ///
    /// Outputs are returned in input order. Tasks that return `Result` have
    /// their errors collected alongside successes.
    pub async fn gather_bounded<I, Fut, T>(&self, tasks: I, limit: usize) -> Vec<T>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = T>,
    {
        stream::iter(tasks)
            .map(|task| self.track(task))
            .buffered(limit.max(1))
            .collect()
            .await
    }

    /// Like [`Self::gather_bounded`] but stop at the first error
    ///
    /// Tasks still in flight when an error arrives are dropped.
    pub async fn try_gather_bounded<I, Fut, T, E>(&self, tasks: I, limit: usize) -> Result<Vec<T>, E>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(tasks)
            .map(|task| self.track_result(task))
            .buffered(limit.max(1))
            .try_collect()
            .await
    }

    /// Apply `f` to every item in sequential chunks of `chunk_size`
    ///
    /// Each chunk runs with at most `limit` in flight. The first failure
    /// aborts the whole operation. A `chunk_size` of 0 uses the default.
    pub async fn map_bounded<I, F, Fut, T, E>(
        &self,
        items: I,
        mut f: F,
        limit: usize,
        chunk_size: usize,
    ) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let mut items = items.into_iter();
        let mut results = Vec::new();

        loop {
            let chunk: Vec<_> = items.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let outputs = self
                .try_gather_bounded(chunk.into_iter().map(&mut f), limit)
                .await?;
            results.extend(outputs);
        }

        Ok(results)
    }

    /// Resize a named semaphore (creating it if absent)
    pub fn set_limit(&self, name: &str, limit: usize) {
        self.inner.semaphores.set_limit(name, limit);
    }

    #[must_use]
    pub fn semaphore_stats(&self) -> Vec<SemaphoreStats> {
        self.inner.semaphores.stats()
    }

    /// Counters plus per-semaphore statistics
    #[must_use]
    pub fn metrics_snapshot(&self) -> AsyncMetricsSnapshot {
        AsyncMetricsSnapshot::capture(&self.inner.metrics, self.inner.semaphores.stats())
    }

    /// Close all semaphores; pending waiters fail with `Cancelled`
    pub fn shutdown(&self) {
        self.inner.semaphores.close_all();
    }

    async fn track<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let guard = self.inner.metrics.begin();
        let value = fut.await;
        guard.finish();
        value
    }

    async fn track_result<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let result = self.track(fut).await;
        if result.is_err() {
            self.inner.metrics.record_failure();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn controller() -> ConcurrencyController {
        ConcurrencyController::new(&ConcurrencyConfig {
            retry_base_delay: Duration::from_millis(1),
            ..ConcurrencyConfig::default()
        })
    }

    #[tokio::test]
    async fn test_run_bounded_returns_output_and_releases() {
        let ctl = controller();
        let value = ctl.run_bounded("db", 1, async { 7 }).await.unwrap();
        assert_eq!(value, 7);

        let stats = ctl.semaphore_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].in_use, 0);
        assert_eq!(ctl.metrics().total_operations(), 1);
    }

    #[tokio::test]
    async fn test_with_timeout_counts_timeouts() {
        let ctl = controller();
        let err = ctl
            .with_timeout(tokio::time::sleep(Duration::from_secs(5)), Duration::from_millis(5))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(ctl.metrics().timeouts(), 1);
        assert_eq!(ctl.metrics().cancellations(), 0);

        assert_eq!(ctl.with_timeout(async { 1 }, Duration::from_secs(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_gather_preserves_order() {
        let ctl = controller();
        let tasks = (0..5u64).map(|i| async move {
            tokio::time::sleep(Duration::from_millis(25 - i * 5)).await;
            i
        });

        let results = ctl.gather_bounded(tasks, 5).await;
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_gather_collects_errors() {
        let ctl = controller();
        let tasks = (0..4).map(|i| async move {
            if i % 2 == 0 { Ok(i) } else { Err(format!("bad {i}")) }
        });

        let results = ctl.gather_bounded(tasks, 2).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[0], Ok(0));
        assert_eq!(results[1], Err("bad 1".to_string()));
    }

    #[tokio::test]
    async fn test_try_gather_stops_at_first_error() {
        let ctl = controller();
        let tasks = (0..4).map(|i| async move {
            if i == 2 { Err("boom") } else { Ok(i) }
        });

        let result = ctl.try_gather_bounded(tasks, 1).await;
        assert_eq!(result, Err("boom"));
        assert_eq!(ctl.metrics().failures(), 1);
    }

    #[tokio::test]
    async fn test_map_bounded_in_chunks() {
        let ctl = controller();
        let in_flight_count = AtomicUsize::new(0);
        let peak_count = AtomicUsize::new(0);
        let (in_flight, peak) = (&in_flight_count, &peak_count);

        let results = ctl
            .map_bounded(
                0..10u32,
                move |i| async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(i * 2)
                },
                2,
                3,
            )
            .await
            .unwrap();

        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak_count.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_retry_simple_uses_attempt_count() {
        let ctl = controller();
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = ctl
            .with_retry_simple(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(anyhow::anyhow!("down")) }
                },
                2,
                None,
            )
            .await;

        assert_eq!(result.unwrap_err().attempts(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctl.metrics().retries(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_includes_semaphores() {
        let ctl = controller();
        ctl.set_limit("agents", 4);
        let snapshot = ctl.metrics_snapshot();
        assert_eq!(snapshot.semaphores.len(), 1);
        assert_eq!(snapshot.semaphores[0].limit, 4);
    }
}
