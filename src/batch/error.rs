//! Batcher error types

use thiserror::Error;
use uuid::Uuid;

use crate::types::ChannelName;

/// Errors returned by the message batcher
#[derive(Debug, Error)]
pub enum BatchError {
    /// The channel's processor failed; the batch was dropped
    #[error("processor for channel '{channel}' failed on batch {batch_id}: {source}")]
    Processing {
        channel: ChannelName,
        batch_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("no processor registered for channel '{0}'")]
    NoProcessor(ChannelName),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress batch payload: {0}")]
    Compression(#[source] std::io::Error),

    #[error("batcher is shut down")]
    Closed,
}

impl BatchError {
    /// Whether the error lost already-queued messages
    #[must_use]
    pub fn is_data_loss(&self) -> bool {
        matches!(self, Self::Processing { .. } | Self::Compression(_))
    }

    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Self::Processing { .. } | Self::Compression(_) => tracing::Level::ERROR,
            Self::NoProcessor(_) | Self::Serialize(_) => tracing::Level::WARN,
            Self::Closed => tracing::Level::DEBUG,
        }
    }
}
