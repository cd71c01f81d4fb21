//! Per-channel message queue

use std::time::{Duration, Instant};

use super::message::Priority;

/// Messages waiting for one channel's next flush
#[derive(Debug)]
pub struct BatchQueue<M> {
    messages: Vec<M>,
    first_enqueued: Option<Instant>,
    bytes: usize,
    has_critical: bool,
}

impl<M> Default for BatchQueue<M> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            first_enqueued: None,
            bytes: 0,
            has_critical: false,
        }
    }
}

impl<M> BatchQueue<M> {
    /// Append a message with its serialized size
    pub fn push(&mut self, message: M, size: usize, priority: Priority) {
        if self.messages.is_empty() {
            self.first_enqueued = Some(Instant::now());
        }
        self.messages.push(message);
        self.bytes += size;
        self.has_critical |= priority == Priority::Critical;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Estimated serialized size of the queued messages
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Age of the oldest queued message
    #[must_use]
    pub fn age(&self) -> Duration {
        self.first_enqueued
            .map_or(Duration::ZERO, |first| first.elapsed())
    }

    /// Whether the queue has waited at least `max_delay`
    #[must_use]
    pub fn is_expired(&self, max_delay: Duration) -> bool {
        !self.is_empty() && self.age() >= max_delay
    }

    /// Flush predicate: size, age, byte volume or a critical message
    #[must_use]
    pub fn should_flush(&self, batch_size: usize, max_delay: Duration, byte_threshold: usize) -> bool {
        if self.is_empty() {
            return false;
        }
        self.has_critical
            || self.len() >= batch_size
            || self.bytes >= byte_threshold
            || self.age() >= max_delay
    }

    /// Take the queued messages in enqueue order
    pub fn into_messages(self) -> Vec<M> {
        self.messages
    }
}
