//! Constants used throughout the performance layer
//!
//! This module centralizes magic numbers and tuning values
//! to improve maintainability and reduce duplication.

use std::time::Duration;

/// Connection pool constants
pub mod pool {
    use super::Duration;

    /// Default minimum connections kept warm per pool
    pub const DEFAULT_MIN_SIZE: usize = 2;

    /// Default maximum connections per pool
    pub const DEFAULT_MAX_SIZE: usize = 10;

    /// Default time allowed to establish a new connection
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Idle connections older than this are reclaimed by the cleanup loop
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

    /// Interval between cleanup passes over idle connections
    pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Lower bound of a pool's load-balancing weight
    pub const MIN_WEIGHT: f64 = 0.1;

    /// Upper bound of a pool's load-balancing weight
    pub const MAX_WEIGHT: f64 = 1.0;

    /// Buffer size for TCP peek during liveness probes
    /// Only 1 byte needed to detect if connection is readable/closed
    pub const TCP_PEEK_BUFFER_SIZE: usize = 1;

    /// Buffer size for reading application probe responses
    pub const PROBE_RESPONSE_BUFFER_SIZE: usize = 512;

    /// TCP keepalive: start probing after this much idle time
    pub const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

    /// TCP keepalive: interval between keepalive probes
    pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
}

/// Health check constants
pub mod health {
    use super::Duration;

    /// Default interval between pool health probes
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    /// Default timeout for a single liveness probe
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Memory manager constants
pub mod memory {
    use super::Duration;

    /// Default interval between memory samples
    pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

    /// Usage percentage above which pressure callbacks fire
    pub const DEFAULT_ALERT_THRESHOLD_PERCENT: f64 = 80.0;

    /// Usage percentage above which pools are shrunk to their minimum
    pub const DEFAULT_EMERGENCY_THRESHOLD_PERCENT: f64 = 95.0;

    /// Growth between two samples that counts as a suspected leak (50 MiB)
    pub const DEFAULT_LEAK_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

    /// Number of pools/types listed when a suspected leak is logged
    pub const LEAK_REPORT_TOP_N: usize = 10;
}

/// Message batcher constants
pub mod batch {
    use super::Duration;

    /// Default maximum number of messages per batch
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

    /// Default maximum age of the oldest queued message
    pub const DEFAULT_MAX_BATCH_DELAY: Duration = Duration::from_millis(50);

    /// Default period of the background flush loop
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

    /// Default payload size (bytes) above which compression is attempted
    pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

    /// Compressed payload must be at most this fraction of the original to be kept
    pub const COMPRESSION_KEEP_RATIO: f64 = 0.8;

    /// Number of processing durations kept per channel
    pub const ADAPTIVE_WINDOW: usize = 100;

    /// Batch size change applied per adaptive adjustment
    pub const ADAPTIVE_STEP: usize = 10;

    /// Smallest effective batch size adaptive sizing may select
    pub const ADAPTIVE_FLOOR: usize = 10;

    /// Average processing time below which batches grow
    pub const FAST_PROCESSING: Duration = Duration::from_millis(100);

    /// Average processing time above which batches shrink
    pub const SLOW_PROCESSING: Duration = Duration::from_secs(1);

    /// Deflate level used for batch payloads (fast)
    pub const COMPRESSION_LEVEL: u32 = 1;
}

/// Concurrency controller constants
pub mod concurrency {
    use super::Duration;

    /// Default limit for semaphores created without an explicit limit
    pub const DEFAULT_SEMAPHORE_LIMIT: usize = 10;

    /// Default number of attempts for retried operations
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default base delay for exponential backoff
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Default number of items processed per chunk by `map_bounded`
    pub const DEFAULT_CHUNK_SIZE: usize = 100;
}

/// Metrics reporting constants
pub mod metrics {
    use super::Duration;

    /// Default interval for periodic metrics emission
    pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_bounds_ordered() {
        assert!(pool::MIN_WEIGHT > 0.0);
        assert!(pool::MIN_WEIGHT < pool::MAX_WEIGHT);
    }

    #[test]
    fn test_memory_thresholds_ordered() {
        assert!(memory::DEFAULT_ALERT_THRESHOLD_PERCENT < memory::DEFAULT_EMERGENCY_THRESHOLD_PERCENT);
        assert!(memory::DEFAULT_EMERGENCY_THRESHOLD_PERCENT <= 100.0);
    }

    #[test]
    fn test_adaptive_window_thresholds() {
        assert!(batch::FAST_PROCESSING < batch::SLOW_PROCESSING);
        assert!(batch::ADAPTIVE_WINDOW > 0);
        assert!(batch::COMPRESSION_KEEP_RATIO < 1.0);
    }
}
