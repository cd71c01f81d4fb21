//! Adaptive message batching

mod adaptive;
mod batcher;
mod compression;
mod error;
mod message;
mod queue;

pub use adaptive::AdaptiveSizer;
pub use batcher::{BatcherStats, MessageBatcher};
pub use compression::{EncodedPayload, deflate, encode_payload, inflate};
pub use error::BatchError;
pub use message::{BatchedMessage, Priority};
pub use queue::BatchQueue;
