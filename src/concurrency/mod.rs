//! Async concurrency control
//!
//! Named semaphores, retries with exponential backoff, deadlines and
//! bounded fan-out over arbitrary futures.

mod controller;
mod error;
mod metrics;
mod retry;
mod semaphore;

pub use controller::ConcurrencyController;
pub use error::ConcurrencyError;
pub use metrics::{AsyncMetrics, AsyncMetricsSnapshot, OperationGuard};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use semaphore::{NamedSemaphore, SemaphoreRegistry, SemaphoreStats};
