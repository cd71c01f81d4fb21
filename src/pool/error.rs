//! Connection pool error types
//!
//! Distinguishes the failure modes callers must handle differently:
//! capacity (`PoolExhausted`), availability (`PoolUnavailable`) and
//! connectivity (`Connect`).

use thiserror::Error;

use crate::types::PoolName;

/// Errors that can occur while acquiring pooled connections
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Every connection of the pool is checked out
    #[error("pool '{pool}' exhausted ({max_size} connections in use)")]
    PoolExhausted { pool: PoolName, max_size: usize },

    /// No pool is healthy (or none is registered)
    #[error("no healthy pool available ({candidates} registered)")]
    PoolUnavailable { candidates: usize },

    #[error("unknown pool '{0}'")]
    UnknownPool(String),

    #[error("pool '{0}' is already registered")]
    DuplicatePool(PoolName),

    /// A liveness probe failed on a pooled connection
    #[error("connection probe failed for pool '{pool}': {reason}")]
    ConnectionProbeFailed { pool: PoolName, reason: String },

    /// Establishing a new connection failed or timed out
    #[error("failed to connect pool '{pool}': {source}")]
    Connect {
        pool: PoolName,
        #[source]
        source: anyhow::Error,
    },

    /// The pool could not be constructed
    #[error("failed to build pool '{pool}': {reason}")]
    Build { pool: PoolName, reason: String },

    /// The pool was shut down
    #[error("pool '{0}' is closed")]
    Closed(PoolName),
}

impl PoolError {
    /// Check if the pool was at capacity
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Check if no healthy pool could be selected
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::PoolUnavailable { .. })
    }

    /// Check if this error is likely transient and the call may succeed later
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. }
                | Self::PoolUnavailable { .. }
                | Self::ConnectionProbeFailed { .. }
                | Self::Connect { .. }
        )
    }

    /// Get the appropriate log level for this error
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Self::PoolExhausted { .. }
            | Self::PoolUnavailable { .. }
            | Self::ConnectionProbeFailed { .. } => tracing::Level::WARN,
            Self::Connect { .. } | Self::Build { .. } => tracing::Level::ERROR,
            Self::UnknownPool(_) | Self::DuplicatePool(_) => tracing::Level::ERROR,
            Self::Closed(_) => tracing::Level::DEBUG,
        }
    }
}
