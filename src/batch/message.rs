//! Batch message types

use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use super::compression::{EncodedPayload, inflate};
use super::error::BatchError;
use crate::types::ChannelName;

/// Delivery priority of a queued message
///
/// A `Critical` message flushes its channel immediately.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// An immutable flushed batch handed to a channel's processor
#[derive(Debug, Clone)]
pub struct BatchedMessage<M> {
    id: Uuid,
    channel: ChannelName,
    messages: Vec<M>,
    original_size: usize,
    compressed_size: usize,
    payload: Vec<u8>,
    compressed: bool,
    created_at: Instant,
}

impl<M> BatchedMessage<M> {
    pub(crate) fn new(channel: ChannelName, messages: Vec<M>, payload: EncodedPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            messages,
            original_size: payload.original_size,
            compressed_size: payload.size(),
            payload: payload.bytes,
            compressed: payload.compressed,
            created_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Messages in enqueue order
    #[must_use]
    pub fn messages(&self) -> &[M] {
        &self.messages
    }

    #[must_use]
    pub fn into_messages(self) -> Vec<M> {
        self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Size of the JSON array payload before compression
    #[must_use]
    pub fn original_size(&self) -> usize {
        self.original_size
    }

    /// Size of the payload as sent; equals `original_size` when not compressed
    #[must_use]
    pub fn compressed_size(&self) -> usize {
        self.compressed_size
    }

    /// Payload bytes as sent (deflated when `is_compressed`)
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The JSON array payload, inflated if needed
    pub fn json_payload(&self) -> Result<Vec<u8>, BatchError> {
        if self.compressed {
            inflate(&self.payload)
        } else {
            Ok(self.payload.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::compression::encode_payload;

    #[test]
    fn test_priority_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_serde() {
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");
        let p: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(p, Priority::Low);
    }

    #[test]
    fn test_uncompressed_batch_sizes_match() {
        let messages = vec![1u32, 2, 3];
        let payload = serde_json::to_vec(&messages).unwrap();
        let encoded = encode_payload(payload.clone(), 1024).unwrap();
        let batch = BatchedMessage::new(ChannelName::from("prices"), messages, encoded);

        assert_eq!(batch.len(), 3);
        assert!(!batch.is_compressed());
        assert_eq!(batch.original_size(), batch.compressed_size());
        assert_eq!(batch.json_payload().unwrap(), payload);
        assert_eq!(batch.channel().as_str(), "prices");
        assert_eq!(batch.id().get_version_num(), 4);
    }

    #[test]
    fn test_compressed_payload_round_trips() {
        let messages: Vec<String> = (0..300).map(|_| "token-launch-alert".to_string()).collect();
        let payload = serde_json::to_vec(&messages).unwrap();
        let encoded = encode_payload(payload.clone(), 1024).unwrap();
        let batch = BatchedMessage::new(ChannelName::from("alerts"), messages, encoded);

        assert!(batch.is_compressed());
        assert!(batch.compressed_size() < batch.original_size());
        assert_eq!(batch.json_payload().unwrap(), payload);
    }
}
