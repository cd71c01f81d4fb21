use std::time::{Duration, Instant};

use crate::constants::pool::{MAX_WEIGHT, MIN_WEIGHT};

/// Health status of a connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Pool is answering health probes
    Healthy,
    /// Pool failed enough consecutive probes to be excluded from selection
    Unhealthy,
}

/// Status change produced by recording a health check outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    BecameUnhealthy,
    Recovered,
}

/// Load-balancing weight for a pool utilization (0.0 to 1.0)
///
/// Idle pools weigh 1.0; saturated pools bottom out at 0.1 so they remain
/// selectable.
#[must_use]
pub fn weight_for_utilization(utilization: f64) -> f64 {
    (1.0 - utilization).clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Health information for a single pool
#[derive(Debug, Clone)]
pub struct PoolHealth {
    pub status: HealthStatus,
    /// When the status was last updated
    pub last_check: Instant,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Number of unhealthy -> healthy transitions
    pub recoveries: u64,
    /// When the pool was last seen as healthy
    pub last_healthy: Option<Instant>,
    /// Selection weight in `[0.1, 1.0]`
    pub weight: f64,
}

impl PoolHealth {
    /// Create a new pool health tracker (healthy, full weight)
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check: Instant::now(),
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            recoveries: 0,
            last_healthy: Some(Instant::now()),
            weight: MAX_WEIGHT,
        }
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Record a successful probe and recompute the weight from `utilization`
    pub fn record_success(&mut self, utilization: f64) -> HealthTransition {
        let was_unhealthy = self.status == HealthStatus::Unhealthy;

        self.status = HealthStatus::Healthy;
        self.last_check = Instant::now();
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.last_healthy = Some(Instant::now());
        self.weight = weight_for_utilization(utilization);

        if was_unhealthy {
            self.recoveries += 1;
            HealthTransition::Recovered
        } else {
            HealthTransition::Unchanged
        }
    }

    /// Record a failed probe
    pub fn record_failure(&mut self, unhealthy_threshold: u32) -> HealthTransition {
        self.last_check = Instant::now();
        self.consecutive_failures += 1;
        self.total_failures += 1;

        if self.status == HealthStatus::Healthy
            && self.consecutive_failures >= unhealthy_threshold.max(1)
        {
            self.status = HealthStatus::Unhealthy;
            HealthTransition::BecameUnhealthy
        } else {
            HealthTransition::Unchanged
        }
    }

    /// Get time since last successful health check
    pub fn time_since_healthy(&self) -> Option<Duration> {
        self.last_healthy.map(|t| t.elapsed())
    }
}

impl Default for PoolHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated health across all pools of a manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthMetrics {
    pub total_checks: u64,
    pub healthy_count: usize,
    pub unhealthy_count: usize,
    pub recovery_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_pool_health_initial_state() {
        let health = PoolHealth::new();
        assert!(health.is_healthy());
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.weight, 1.0);
        assert!(health.last_healthy.is_some());
    }

    #[test]
    fn test_weight_clamped() {
        assert_eq!(weight_for_utilization(0.0), 1.0);
        assert!((weight_for_utilization(0.4) - 0.6).abs() < f64::EPSILON);
        assert_eq!(weight_for_utilization(1.0), 0.1);
        assert_eq!(weight_for_utilization(0.95), 0.1);
    }

    #[test]
    fn test_success_recomputes_weight() {
        let mut health = PoolHealth::new();
        assert_eq!(health.record_success(0.5), HealthTransition::Unchanged);
        assert_eq!(health.weight, 0.5);
        assert_eq!(health.total_successes, 1);
    }

    #[test]
    fn test_failure_below_threshold() {
        let mut health = PoolHealth::new();
        assert_eq!(health.record_failure(3), HealthTransition::Unchanged);
        assert_eq!(health.record_failure(3), HealthTransition::Unchanged);
        assert!(health.is_healthy());
        assert_eq!(health.consecutive_failures, 2);
    }

    #[test]
    fn test_single_transition_per_outage() {
        let mut health = PoolHealth::new();
        assert_eq!(health.record_failure(1), HealthTransition::BecameUnhealthy);
        assert_eq!(health.record_failure(1), HealthTransition::Unchanged);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.total_failures, 2);
    }

    #[test]
    fn test_recovery_from_unhealthy() {
        let mut health = PoolHealth::new();
        health.record_failure(1);

        assert_eq!(health.record_success(0.0), HealthTransition::Recovered);
        assert!(health.is_healthy());
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.recoveries, 1);
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let mut health = PoolHealth::new();
        assert_eq!(health.record_failure(0), HealthTransition::BecameUnhealthy);
    }

    #[test]
    fn test_time_since_healthy() {
        let mut health = PoolHealth::new();

        sleep(Duration::from_millis(10));
        let elapsed = health
            .time_since_healthy()
            .expect("Should have last_healthy time");
        assert!(elapsed >= Duration::from_millis(10));

        health.record_failure(1);
        assert!(health.time_since_healthy().is_some());
    }
}
