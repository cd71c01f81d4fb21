//! Retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ConcurrencyError;
use super::metrics::AsyncMetrics;
use crate::constants::concurrency::DEFAULT_BASE_DELAY;
use crate::types::AttemptCount;

/// How an operation is retried
///
/// The delay after failed attempt `n` (0-based) is `2^n * base_delay`,
/// capped by `max_delay` when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: AttemptCount,
    /// Deadline for each individual attempt
    pub timeout: Option<Duration>,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
    /// Whether an attempt that hit its deadline may be retried
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: AttemptCount::DEFAULT,
            timeout: None,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
            retry_on_timeout: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` (0 is treated as 1) and defaults otherwise
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: AttemptCount::new(max_attempts.max(1)).unwrap_or(AttemptCount::DEFAULT),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    #[must_use]
    pub fn retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up
///
/// Each attempt is created fresh from `op`. Attempts that exceed the policy
/// timeout are dropped (cancelled) and count as failures.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    metrics: &AsyncMetrics,
    mut op: F,
) -> Result<T, ConcurrencyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let max_attempts = policy.max_attempts.get();
    let mut attempt = 0u32;

    loop {
        let guard = metrics.begin();
        let outcome = match policy.timeout {
            Some(after) => match tokio::time::timeout(after, op()).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => {
                    metrics.record_timeout();
                    if !policy.retry_on_timeout {
                        guard.finish();
                        metrics.record_failure();
                        return Err(ConcurrencyError::Timeout { after });
                    }
                    Err(anyhow::Error::new(ConcurrencyError::Timeout { after }))
                }
            },
            None => op().await.map_err(Into::into),
        };
        guard.finish();
        attempt += 1;

        let last_error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            metrics.record_failure();
            warn!(
                attempts = attempt,
                error = %last_error,
                "Operation failed after all retry attempts"
            );
            return Err(ConcurrencyError::RetryExhausted {
                attempts: attempt,
                source: last_error,
            });
        }

        let delay = policy.backoff_delay(attempt - 1);
        metrics.record_retry();
        debug!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %last_error,
            "Retrying operation"
        );
        tokio::time::sleep(delay).await;
    }
}
