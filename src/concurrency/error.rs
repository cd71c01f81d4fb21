//! Errors produced by the concurrency controller

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running bounded, timed or retried work
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConcurrencyError {
    /// Every attempt failed; wraps the error of the last attempt
    #[error("operation failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The operation did not complete before its deadline
    #[error("operation timed out after {after:?}")]
    Timeout { after: Duration },

    /// The controller shut down while the operation waited for a permit
    #[error("operation on semaphore '{0}' was cancelled")]
    Cancelled(String),
}

impl ConcurrencyError {
    /// Check if this error is a timeout (directly or as the last retry failure)
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::RetryExhausted { source, .. } => source
                .downcast_ref::<ConcurrencyError>()
                .is_some_and(|e| matches!(e, Self::Timeout { .. })),
            Self::Cancelled(_) => false,
        }
    }

    /// Number of attempts made, if this error came out of a retry loop
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Get the appropriate log level for this error
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Self::RetryExhausted { .. } => tracing::Level::ERROR,
            Self::Timeout { .. } => tracing::Level::WARN,
            Self::Cancelled(_) => tracing::Level::DEBUG,
        }
    }
}
