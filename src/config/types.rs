//! Configuration type definitions
//!
//! This module contains all the configuration structures of the performance layer.

use crate::types::{
    BatchSize, MaxPoolSize, PoolName, SemaphoreLimit, ThresholdPercent, duration_ms_serde,
    duration_serde,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults;

/// Main configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Pooled TCP endpoints (cache store, database, ...)
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub batcher: BatcherConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// A single named connection pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    pub name: PoolName,
    pub host: String,
    #[serde(default = "defaults::pool_port")]
    pub port: u16,
    /// Idle connections kept warm (pre-created at start-up)
    #[serde(default = "defaults::min_size")]
    pub min_size: usize,
    #[serde(default = "defaults::max_size")]
    pub max_size: MaxPoolSize,
    #[serde(
        rename = "connect_timeout_ms",
        with = "duration_ms_serde",
        default = "defaults::connect_timeout"
    )]
    pub connect_timeout: Duration,
    #[serde(
        rename = "idle_timeout_secs",
        with = "duration_serde",
        default = "defaults::idle_timeout"
    )]
    pub idle_timeout: Duration,
    /// Application-level liveness probe; a socket peek is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeConfig>,
}

impl PoolConfig {
    /// Pool with default sizing for `host:port`
    #[must_use]
    pub fn new(name: impl Into<PoolName>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            min_size: defaults::min_size(),
            max_size: defaults::max_size(),
            connect_timeout: defaults::connect_timeout(),
            idle_timeout: defaults::idle_timeout(),
            probe: None,
        }
    }

    /// `host:port` address string
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Request/response probe sent over a pooled connection
///
/// For Redis: `request = "PING\r\n"`, `expect = "+PONG"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeConfig {
    pub request: String,
    /// Prefix the response must start with
    pub expect: String,
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckConfig {
    #[serde(
        rename = "interval_secs",
        with = "duration_serde",
        default = "defaults::health_check_interval"
    )]
    pub interval: Duration,
    /// Timeout for each probe
    #[serde(
        rename = "timeout_ms",
        with = "duration_ms_serde",
        default = "defaults::health_check_timeout"
    )]
    pub timeout: Duration,
    /// Number of consecutive failures before marking a pool unhealthy
    #[serde(default = "defaults::unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: defaults::health_check_interval(),
            timeout: defaults::health_check_timeout(),
            unhealthy_threshold: defaults::unhealthy_threshold(),
        }
    }
}

/// Idle connection reclamation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanupConfig {
    #[serde(
        rename = "interval_secs",
        with = "duration_serde",
        default = "defaults::cleanup_interval"
    )]
    pub interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: defaults::cleanup_interval(),
        }
    }
}

/// Message batcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatcherConfig {
    #[serde(default = "defaults::max_batch_size")]
    pub max_batch_size: BatchSize,
    /// Oldest message age that forces a flush
    #[serde(
        rename = "max_batch_delay_ms",
        with = "duration_ms_serde",
        default = "defaults::max_batch_delay"
    )]
    pub max_batch_delay: Duration,
    #[serde(
        rename = "flush_interval_ms",
        with = "duration_ms_serde",
        default = "defaults::flush_interval"
    )]
    pub flush_interval: Duration,
    /// Byte size above which a batch is flushed and compressed
    #[serde(default = "defaults::compression_threshold")]
    pub compression_threshold: usize,
    #[serde(default = "defaults::enabled")]
    pub enable_compression: bool,
    /// Grow or shrink batch sizes from observed processing times
    #[serde(default = "defaults::enabled")]
    pub adaptive_sizing: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: defaults::max_batch_size(),
            max_batch_delay: defaults::max_batch_delay(),
            flush_interval: defaults::flush_interval(),
            compression_threshold: defaults::compression_threshold(),
            enable_compression: true,
            adaptive_sizing: true,
        }
    }
}

/// Memory monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    #[serde(
        rename = "monitor_interval_secs",
        with = "duration_serde",
        default = "defaults::monitor_interval"
    )]
    pub monitor_interval: Duration,
    #[serde(default = "defaults::alert_threshold_percent")]
    pub alert_threshold_percent: ThresholdPercent,
    #[serde(default = "defaults::emergency_threshold_percent")]
    pub emergency_threshold_percent: ThresholdPercent,
    #[serde(default = "defaults::leak_threshold_bytes")]
    pub leak_threshold_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            monitor_interval: defaults::monitor_interval(),
            alert_threshold_percent: defaults::alert_threshold_percent(),
            emergency_threshold_percent: defaults::emergency_threshold_percent(),
            leak_threshold_bytes: defaults::leak_threshold_bytes(),
        }
    }
}

/// Concurrency controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyConfig {
    /// Limit for semaphores created without an explicit one
    #[serde(default = "defaults::semaphore_limit")]
    pub default_semaphore_limit: SemaphoreLimit,
    #[serde(
        rename = "retry_base_delay_ms",
        with = "duration_ms_serde",
        default = "defaults::retry_base_delay"
    )]
    pub retry_base_delay: Duration,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            default_semaphore_limit: defaults::semaphore_limit(),
            retry_base_delay: defaults::retry_base_delay(),
        }
    }
}

/// Periodic metrics reporting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(
        rename = "report_interval_secs",
        with = "duration_serde",
        default = "defaults::report_interval"
    )]
    pub report_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval: defaults::report_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.pools.is_empty());
        assert_eq!(config.batcher.max_batch_size.get(), 100);
        assert_eq!(config.memory.emergency_threshold_percent.get(), 95.0);
    }

    #[test]
    fn test_pool_defaults_and_renames() {
        let toml = r#"
            [[pools]]
            name = "cache"
            host = "127.0.0.1"
            max_size = 5
            connect_timeout_ms = 250
            idle_timeout_secs = 60

            [pools.probe]
            request = "PING\r\n"
            expect = "+PONG"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let pool = &config.pools[0];

        assert_eq!(pool.name.as_str(), "cache");
        assert_eq!(pool.port, 6379);
        assert_eq!(pool.min_size, 2);
        assert_eq!(pool.max_size.get(), 5);
        assert_eq!(pool.connect_timeout, Duration::from_millis(250));
        assert_eq!(pool.idle_timeout, Duration::from_secs(60));
        assert_eq!(pool.probe.as_ref().unwrap().expect, "+PONG");
        assert_eq!(pool.address(), "127.0.0.1:6379");
    }

    #[test]
    fn test_sections_parse() {
        let toml = r#"
            [health_check]
            interval_secs = 10
            timeout_ms = 500

            [batcher]
            max_batch_size = 3
            max_batch_delay_ms = 500
            enable_compression = false

            [memory]
            alert_threshold_percent = 70.0
            leak_threshold_bytes = 1024

            [concurrency]
            default_semaphore_limit = 4
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.health_check.interval, Duration::from_secs(10));
        assert_eq!(config.health_check.timeout, Duration::from_millis(500));
        assert_eq!(config.health_check.unhealthy_threshold, 1);
        assert_eq!(config.batcher.max_batch_size.get(), 3);
        assert!(!config.batcher.enable_compression);
        assert!(config.batcher.adaptive_sizing);
        assert_eq!(config.memory.alert_threshold_percent.get(), 70.0);
        assert_eq!(config.memory.leak_threshold_bytes, 1024);
        assert_eq!(config.concurrency.default_semaphore_limit.get(), 4);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result: Result<Config, _> = toml::from_str("[memory]\nalert_threshold_percent = 150.0");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_max_size_rejected() {
        let toml = r#"
            [[pools]]
            name = "db"
            host = "localhost"
            max_size = 0
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_round_trip_serialization() {
        let mut config = Config::default();
        config.pools.push(PoolConfig::new("cache", "localhost", 6379));

        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
