//! Default values for configuration fields
//!
//! This module centralizes all default value functions used in serde deserialization.

use crate::constants::{batch, concurrency, health, memory, pool};
use crate::types::{BatchSize, MaxPoolSize, SemaphoreLimit, ThresholdPercent};
use std::time::Duration;

/// Default port for pooled TCP endpoints (Redis)
#[inline]
pub fn pool_port() -> u16 {
    6379
}

/// Default minimum idle connections per pool
#[inline]
pub fn min_size() -> usize {
    pool::DEFAULT_MIN_SIZE
}

/// Default maximum connections per pool
#[inline]
pub fn max_size() -> MaxPoolSize {
    MaxPoolSize::DEFAULT
}

#[inline]
pub fn connect_timeout() -> Duration {
    pool::DEFAULT_CONNECT_TIMEOUT
}

/// Default time an idle connection may stay in the pool
#[inline]
pub fn idle_timeout() -> Duration {
    pool::DEFAULT_IDLE_TIMEOUT
}

/// Default health check interval
#[inline]
pub fn health_check_interval() -> Duration {
    health::DEFAULT_INTERVAL
}

/// Default timeout for each health probe
#[inline]
pub fn health_check_timeout() -> Duration {
    health::DEFAULT_PROBE_TIMEOUT
}

/// Default number of consecutive failures before a pool is marked unhealthy
#[inline]
pub fn unhealthy_threshold() -> u32 {
    1
}

#[inline]
pub fn cleanup_interval() -> Duration {
    pool::DEFAULT_CLEANUP_INTERVAL
}

#[inline]
pub fn max_batch_size() -> BatchSize {
    BatchSize::DEFAULT
}

#[inline]
pub fn max_batch_delay() -> Duration {
    batch::DEFAULT_MAX_BATCH_DELAY
}

#[inline]
pub fn flush_interval() -> Duration {
    batch::DEFAULT_FLUSH_INTERVAL
}

/// Default payload size (bytes) above which batches are compressed
#[inline]
pub fn compression_threshold() -> usize {
    batch::DEFAULT_COMPRESSION_THRESHOLD
}

/// Shared default for boolean feature switches that are on unless disabled
#[inline]
pub fn enabled() -> bool {
    true
}

#[inline]
pub fn monitor_interval() -> Duration {
    memory::DEFAULT_MONITOR_INTERVAL
}

/// Default memory usage that triggers pressure callbacks (80%)
#[inline]
pub fn alert_threshold_percent() -> ThresholdPercent {
    ThresholdPercent::try_new(memory::DEFAULT_ALERT_THRESHOLD_PERCENT)
        .expect("80.0 is a valid percentage")
}

/// Default memory usage that triggers emergency shrinking (95%)
#[inline]
pub fn emergency_threshold_percent() -> ThresholdPercent {
    ThresholdPercent::try_new(memory::DEFAULT_EMERGENCY_THRESHOLD_PERCENT)
        .expect("95.0 is a valid percentage")
}

/// Default growth between samples reported as a possible leak (50 MiB)
#[inline]
pub fn leak_threshold_bytes() -> u64 {
    memory::DEFAULT_LEAK_THRESHOLD_BYTES
}

#[inline]
pub fn semaphore_limit() -> SemaphoreLimit {
    SemaphoreLimit::DEFAULT
}

#[inline]
pub fn retry_base_delay() -> Duration {
    concurrency::DEFAULT_BASE_DELAY
}

/// Default interval between metrics reports
#[inline]
pub fn report_interval() -> Duration {
    crate::constants::metrics::DEFAULT_REPORT_INTERVAL
}
