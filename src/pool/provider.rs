//! Named connection pool
//!
//! [`NamedPool`] wraps a deadpool pool of [`Connector`] connections and adds:
//! - Non-blocking acquisition (exhaustion is an error, never a wait)
//! - Health tracking with a utilization-derived selection weight
//! - Idle reclamation that never drops below `min_size`, plus refill
//! - Background health and cleanup loops stopped by a broadcast signal

use deadpool::managed;
use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::connector::Connector;
use super::deadpool_connection::{ConnectorManager, Pool, PoolCounters, PoolHandle};
use super::error::PoolError;
use crate::config::{HealthCheckConfig, PoolConfig};
use crate::constants::{health, pool};
use crate::health::{HealthTransition, PoolHealth};
use crate::metrics::{EmitMetrics, MetricsSink};
use crate::types::{
    AvailableConnections, CreatedConnections, InUseConnections, MaxPoolSize, PoolName,
};

/// Sizing and timing of a single pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: MaxPoolSize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// Deadline for pinging an idle connection before handing it out
    pub probe_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: pool::DEFAULT_MIN_SIZE,
            max_size: MaxPoolSize::DEFAULT,
            connect_timeout: pool::DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: pool::DEFAULT_IDLE_TIMEOUT,
            probe_timeout: health::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl PoolSettings {
    #[must_use]
    pub fn from_config(pool: &PoolConfig, health: &HealthCheckConfig) -> Self {
        Self {
            min_size: pool.min_size,
            max_size: pool.max_size,
            connect_timeout: pool.connect_timeout,
            idle_timeout: pool.idle_timeout,
            probe_timeout: health.timeout,
        }
    }
}

/// Result of one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Idle connections closed for exceeding `idle_timeout`
    pub removed: usize,
    /// Connections created to restore `min_size`
    pub refilled: usize,
}

/// Builder for [`NamedPool`]
///
/// # Examples
///
/// ```no_run
/// use swarm_perf::pool::{NamedPool, TcpConnector};
///
/// let pool = NamedPool::builder("cache", TcpConnector::new("127.0.0.1", 6379))
///     .min_size(2)
///     .max_size(5)
///     .build()
///     .unwrap();
/// ```
pub struct Builder<C: Connector> {
    name: PoolName,
    connector: C,
    settings: PoolSettings,
}

impl<C: Connector> Builder<C> {
    #[must_use]
    pub fn new(name: impl Into<PoolName>, connector: C) -> Self {
        Self {
            name: name.into(),
            connector,
            settings: PoolSettings::default(),
        }
    }

    /// Idle connections kept warm
    #[must_use]
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.settings.min_size = min_size;
        self
    }

    /// Maximum connections (idle + in use); 0 is treated as 1
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.settings.max_size = MaxPoolSize::new(max_size.max(1)).unwrap_or(MaxPoolSize::DEFAULT);
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.settings.probe_timeout = timeout;
        self
    }

    /// Replace every setting at once
    #[must_use]
    pub fn settings(mut self, settings: PoolSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the pool (no connections are opened yet)
    pub fn build(self) -> Result<NamedPool<C>, PoolError> {
        let mut settings = self.settings;
        if settings.min_size > settings.max_size.get() {
            warn!(
                pool = %self.name,
                min_size = settings.min_size,
                max_size = settings.max_size.get(),
                "min_size exceeds max_size, clamping"
            );
            settings.min_size = settings.max_size.get();
        }

        let counters = Arc::new(PoolCounters::default());
        let manager = ConnectorManager::new(
            self.connector,
            self.name.clone(),
            settings.connect_timeout,
            settings.probe_timeout,
            Arc::clone(&counters),
        );
        let inner = Pool::builder(manager)
            .max_size(settings.max_size.get())
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| PoolError::Build {
                pool: self.name.clone(),
                reason: e.to_string(),
            })?;

        info!(
            pool = %self.name,
            min_size = settings.min_size,
            max_size = settings.max_size.get(),
            "Created connection pool"
        );

        Ok(NamedPool {
            name: self.name,
            inner,
            settings,
            counters,
            health: Mutex::new(PoolHealth::new()),
        })
    }
}

/// A named pool of connections produced by a [`Connector`]
pub struct NamedPool<C: Connector> {
    name: PoolName,
    inner: Pool<C>,
    settings: PoolSettings,
    counters: Arc<PoolCounters>,
    health: Mutex<PoolHealth>,
}

impl<C: Connector> std::fmt::Debug for NamedPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPool")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("status", &self.inner.status())
            .finish()
    }
}

impl<C: Connector> NamedPool<C> {
    /// Create a builder for a pool named `name`
    #[must_use]
    pub fn builder(name: impl Into<PoolName>, connector: C) -> Builder<C> {
        Builder::new(name, connector)
    }

    #[must_use]
    pub fn name(&self) -> &PoolName {
        &self.name
    }

    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// The connector used to open connections
    #[must_use]
    pub fn connector(&self) -> &C {
        self.inner.manager().connector()
    }

    /// Borrow a connection without waiting
    ///
    /// Idle connections are probed first; ones that fail are discarded and
    /// the next is tried. With none left a new one is opened if capacity
    /// remains, otherwise this fails with [`PoolError::PoolExhausted`].
    pub async fn acquire(&self) -> Result<PoolHandle<C>, PoolError> {
        let object = self.get_object().await?;
        self.counters.record_acquisition();
        Ok(PoolHandle::new(
            object,
            self.name.clone(),
            Arc::clone(&self.counters),
        ))
    }

    /// Caller-facing zero-wait checkout; a full pool counts as exhaustion
    async fn get_object(&self) -> Result<managed::Object<ConnectorManager<C>>, PoolError> {
        match self.try_get_object().await? {
            Some(object) => Ok(object),
            None => {
                self.counters.record_exhaustion();
                warn!(
                    pool = %self.name,
                    max_size = self.settings.max_size.get(),
                    "Connection pool exhausted"
                );
                Err(PoolError::PoolExhausted {
                    pool: self.name.clone(),
                    max_size: self.settings.max_size.get(),
                })
            }
        }
    }

    /// Zero-wait checkout for health checks and refills
    ///
    /// `Ok(None)` means every connection is borrowed; nothing is counted.
    async fn try_get_object(
        &self,
    ) -> Result<Option<managed::Object<ConnectorManager<C>>>, PoolError> {
        let timeouts = managed::Timeouts {
            wait: Some(Duration::ZERO),
            ..managed::Timeouts::new()
        };

        match self.inner.timeout_get(&timeouts).await {
            Ok(object) => Ok(Some(object)),
            Err(managed::PoolError::Timeout(managed::TimeoutType::Wait)) => Ok(None),
            Err(managed::PoolError::Backend(source)) => {
                self.counters.record_failed_connection();
                Err(PoolError::Connect {
                    pool: self.name.clone(),
                    source,
                })
            }
            Err(managed::PoolError::Closed) => Err(PoolError::Closed(self.name.clone())),
            Err(other) => Err(PoolError::Connect {
                pool: self.name.clone(),
                source: anyhow::anyhow!("{}", other),
            }),
        }
    }

    /// Current pool status
    #[must_use]
    pub fn status(&self) -> PoolStats {
        let status = self.inner.status();
        let health = self.health_snapshot();
        let in_use = status.size.saturating_sub(status.available);

        PoolStats {
            name: self.name.clone(),
            size: status.size,
            available: AvailableConnections::new(status.available),
            in_use: InUseConnections::new(in_use),
            min_size: self.settings.min_size,
            max_size: status.max_size,
            healthy: health.is_healthy(),
            weight: health.weight,
            consecutive_failures: health.consecutive_failures,
            total_checks: health.total_successes + health.total_failures,
            recoveries: health.recoveries,
            failed_connections: self.counters.failed_connections(),
            exhaustion_count: self.counters.exhaustion_count(),
            unhealthy_transitions: self.counters.unhealthy_transitions(),
            created: CreatedConnections::new(self.counters.created()),
            discarded: self.counters.discarded(),
            acquisitions: self.counters.acquisitions(),
        }
    }

    /// Connections currently borrowed
    #[must_use]
    pub fn in_use(&self) -> InUseConnections {
        let status = self.inner.status();
        InUseConnections::new(status.size.saturating_sub(status.available))
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health_snapshot().is_healthy()
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.health_snapshot().weight
    }

    fn health_snapshot(&self) -> PoolHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one health probe and update the pool's status and weight
    ///
    /// Checking out an idle connection runs its live probe; failing entries
    /// are discarded and a fresh connection is opened in their place. The
    /// pool is healthy if the checkout yields a usable connection.
    ///
    /// Returns `None` when the pool had no connection to spare for the
    /// probe (all borrowed), in which case the status is left unchanged.
    pub async fn check_health(&self, unhealthy_threshold: u32) -> Option<HealthTransition> {
        // Sampled before the check borrows a connection of its own
        let utilization = self
            .in_use()
            .utilization(self.settings.max_size.get());

        let outcome = match self.try_get_object().await {
            Ok(Some(object)) => {
                drop(object);
                Ok(())
            }
            Ok(None) => {
                debug!(pool = %self.name, "Skipping health check, all connections borrowed");
                return None;
            }
            Err(PoolError::Connect { source, .. }) => Err(PoolError::ConnectionProbeFailed {
                pool: self.name.clone(),
                reason: format!("{source:#}"),
            }),
            Err(e) => Err(e),
        };

        let transition = {
            let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            match &outcome {
                Ok(()) => health.record_success(utilization),
                Err(_) => health.record_failure(unhealthy_threshold),
            }
        };

        match (&outcome, transition) {
            (Err(e), HealthTransition::BecameUnhealthy) => {
                self.counters.record_unhealthy_transition();
                warn!(pool = %self.name, error = %e, "Pool marked unhealthy");
            }
            (Err(e), _) => {
                debug!(pool = %self.name, error = %e, "Health check failed");
            }
            (Ok(()), HealthTransition::Recovered) => {
                info!(pool = %self.name, "Pool recovered");
            }
            (Ok(()), _) => {}
        }

        Some(transition)
    }

    /// Close idle connections past `idle_timeout` (keeping `min_size`), then refill
    pub async fn cleanup(&self) -> CleanupReport {
        let removable = self.inner.status().size.saturating_sub(self.settings.min_size);
        let idle_timeout = self.settings.idle_timeout;
        let budget = Cell::new(removable);

        let result = self.inner.retain(|_, metrics| {
            if budget.get() > 0 && metrics.last_used() > idle_timeout {
                budget.set(budget.get() - 1);
                false
            } else {
                true
            }
        });
        let removed = result.removed.len();
        if removed > 0 {
            self.counters.record_discarded(removed as u64);
            debug!(pool = %self.name, removed, "Closed idle connections");
        }

        let refilled = self.refill().await;
        CleanupReport { removed, refilled }
    }

    /// Open connections until the pool holds at least `min_size`
    ///
    /// Returns the number of connections created.
    pub async fn refill(&self) -> usize {
        let min_size = self.settings.min_size;
        if self.inner.status().size >= min_size {
            return 0;
        }

        // Idle entries are handed out before new ones are opened, so keep
        // everything checked out until the pool has grown to min_size
        let before = self.counters.created();
        let mut held = Vec::with_capacity(min_size);
        while self.inner.status().size < min_size && held.len() < self.settings.max_size.get() {
            match self.try_get_object().await {
                Ok(Some(object)) => held.push(object),
                Ok(None) => break,
                Err(e) => {
                    warn!(pool = %self.name, error = %e, "Failed to refill pool");
                    break;
                }
            }
        }
        drop(held);

        let created = self.counters.created().saturating_sub(before) as usize;
        if created > 0 {
            debug!(pool = %self.name, created, "Refilled pool to min_size");
        }
        created
    }

    /// Periodically probe the pool until `shutdown_rx` fires
    pub(crate) async fn run_health_checks(
        self: Arc<Self>,
        interval: Duration,
        unhealthy_threshold: u32,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!(
            pool = %self.name,
            interval_secs = interval.as_secs(),
            "Starting periodic health checks"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
            }
            self.check_health(unhealthy_threshold).await;
        }

        info!(pool = %self.name, "Periodic health check task terminated");
    }

    /// Periodically reclaim idle connections until `shutdown_rx` fires
    pub(crate) async fn run_cleanup(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
            }
            let report = self.cleanup().await;
            if report.removed > 0 || report.refilled > 0 {
                info!(
                    pool = %self.name,
                    removed = report.removed,
                    refilled = report.refilled,
                    "Pool cleanup complete"
                );
            }
        }

        debug!(pool = %self.name, "Pool cleanup task terminated");
    }

    /// Close the pool; idle connections are dropped and new borrows fail
    pub fn close(&self) {
        let status = self.inner.status();
        info!(
            pool = %self.name,
            idle = status.available,
            "Closing connection pool"
        );
        self.inner.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Snapshot of one pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    pub name: PoolName,
    /// Connections currently open (idle + borrowed)
    pub size: usize,
    pub available: AvailableConnections,
    pub in_use: InUseConnections,
    pub min_size: usize,
    pub max_size: usize,
    pub healthy: bool,
    pub weight: f64,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub recoveries: u64,
    pub failed_connections: u64,
    pub exhaustion_count: u64,
    pub unhealthy_transitions: u64,
    pub created: CreatedConnections,
    pub discarded: u64,
    pub acquisitions: u64,
}

impl EmitMetrics for PoolStats {
    fn emit(&self, sink: &dyn MetricsSink) {
        let tags = [("pool", self.name.as_str())];
        sink.record("pool.size", self.size as f64, &tags);
        sink.record("pool.available", self.available.get() as f64, &tags);
        sink.record("pool.in_use", self.in_use.get() as f64, &tags);
        sink.record("pool.max_size", self.max_size as f64, &tags);
        sink.record("pool.healthy", if self.healthy { 1.0 } else { 0.0 }, &tags);
        sink.record("pool.weight", self.weight, &tags);
        sink.record("pool.failed_connections", self.failed_connections as f64, &tags);
        sink.record("pool.exhaustion_count", self.exhaustion_count as f64, &tags);
        sink.record("pool.created", self.created.get() as f64, &tags);
        sink.record("pool.discarded", self.discarded as f64, &tags);
        sink.record("pool.acquisitions", self.acquisitions as f64, &tags);
    }
}
