//! Configuration validation
//!
//! This module provides validation logic for the configuration to ensure
//! all settings are valid before the layer starts.

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;

use super::types::{Config, PoolConfig};

const MIN_RECOMMENDED_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

impl Config {
    /// Validate configuration for correctness
    ///
    /// Non-zero sizes and percentage ranges are enforced by the types. This
    /// checks the remaining semantic constraints:
    /// - Pool names are unique and `min_size <= max_size`
    /// - The alert threshold does not exceed the emergency threshold
    /// - Intervals are non-zero
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for pool in &self.pools {
            if !names.insert(pool.name.as_str()) {
                return Err(anyhow::anyhow!(
                    "Duplicate pool name '{}' in configuration",
                    pool.name
                ));
            }
            validate_pool(pool)?;
        }

        if self.memory.alert_threshold_percent > self.memory.emergency_threshold_percent {
            return Err(anyhow::anyhow!(
                "memory.alert_threshold_percent ({}) must not exceed memory.emergency_threshold_percent ({})",
                self.memory.alert_threshold_percent,
                self.memory.emergency_threshold_percent
            ));
        }

        for (field, interval) in [
            ("health_check.interval_secs", self.health_check.interval),
            ("cleanup.interval_secs", self.cleanup.interval),
            ("batcher.flush_interval_ms", self.batcher.flush_interval),
            ("memory.monitor_interval_secs", self.memory.monitor_interval),
            ("metrics.report_interval_secs", self.metrics.report_interval),
        ] {
            if interval.is_zero() {
                return Err(anyhow::anyhow!("{} must be greater than zero", field));
            }
        }

        if self.cleanup.interval < MIN_RECOMMENDED_CLEANUP_INTERVAL {
            tracing::warn!(
                "cleanup.interval_secs is {:?} (< {:?}). Idle reclamation this frequent \
                 causes connection churn.",
                self.cleanup.interval,
                MIN_RECOMMENDED_CLEANUP_INTERVAL
            );
        }

        Ok(())
    }
}

/// Validate a single pool configuration
fn validate_pool(pool: &PoolConfig) -> Result<()> {
    if pool.name.as_str().is_empty() {
        return Err(anyhow::anyhow!("Pool name must not be empty"));
    }

    if pool.host.is_empty() {
        return Err(anyhow::anyhow!("Pool '{}' has an empty host", pool.name));
    }

    if pool.min_size > pool.max_size.get() {
        return Err(anyhow::anyhow!(
            "Pool '{}' has min_size {} greater than max_size {}",
            pool.name,
            pool.min_size,
            pool.max_size
        ));
    }

    if pool.connect_timeout.is_zero() {
        tracing::warn!(
            "Pool '{}' has connect_timeout_ms = 0; every connection attempt will time out",
            pool.name
        );
    }

    Ok(())
}
