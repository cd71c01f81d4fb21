//! # swarm-perf
//!
//! In-process performance layer for the token-launch monitor backend:
//!
//! - [`pool`]: named, health-checked connection pools on deadpool with
//!   weighted least-loaded selection and fail-fast exhaustion
//! - [`memory`]: lock-free object pools, a tracking registry and a memory
//!   monitor with pressure callbacks, emergency shrink and leak heuristics
//! - [`batch`]: per-channel adaptive message batching with optional deflate
//! - [`concurrency`]: named semaphores, bounded gather/map, timeouts and
//!   retry with exponential backoff
//!
//! [`PerformanceLayer`] wires them together from one [`Config`].

pub mod batch;
pub mod concurrency;
pub mod config;
pub mod constants;
pub mod health;
pub mod layer;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod pool;
pub mod runtime;
pub mod types;

#[cfg(test)]
mod test_macros;

pub use batch::{BatchError, BatchedMessage, MessageBatcher, Priority};
pub use concurrency::{ConcurrencyController, ConcurrencyError, RetryPolicy};
pub use config::{Config, create_default_config, load_config, load_or_create_config};
pub use layer::{MetricsSource, PerformanceLayer};
pub use memory::{MemoryManager, ObjectPool, Pooled, ResetError, Resettable};
pub use metrics::{EmitMetrics, MetricsSink, NoopSink, RecordingSink, TracingSink};
pub use pool::{ConnectionPoolManager, Connector, NamedPool, PoolError, PoolHandle, TcpConnector};
