//! Connection pool manager
//!
//! Owns the named pools of one connector type, starts their background
//! health and cleanup loops, and routes unnamed acquisitions to the least
//! loaded healthy pool.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::connector::Connector;
use super::deadpool_connection::PoolHandle;
use super::error::PoolError;
use super::provider::{CleanupReport, NamedPool, PoolStats};
use super::selection::{PoolLoad, select_least_loaded};
use crate::config::{CleanupConfig, HealthCheckConfig};
use crate::health::HealthMetrics;
use crate::metrics::{EmitMetrics, MetricsSink};

/// Manager of named connection pools sharing one [`Connector`] type
///
/// Create one manager per resource kind (cache store, database).
pub struct ConnectionPoolManager<C: Connector> {
    pools: RwLock<Vec<Arc<NamedPool<C>>>>,
    health_check: HealthCheckConfig,
    cleanup: CleanupConfig,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connector> std::fmt::Debug for ConnectionPoolManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPoolManager")
            .field("pools", &self.pool_names())
            .field("health_check", &self.health_check)
            .field("cleanup", &self.cleanup)
            .finish()
    }
}

impl<C: Connector> ConnectionPoolManager<C> {
    #[must_use]
    pub fn new(health_check: HealthCheckConfig, cleanup: CleanupConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pools: RwLock::new(Vec::new()),
            health_check,
            cleanup,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a pool, pre-warm it to `min_size` and start its background loops
    ///
    /// Pre-warm failures are logged; the cleanup loop keeps refilling.
    pub async fn add_pool(&self, pool: NamedPool<C>) -> Result<Arc<NamedPool<C>>, PoolError> {
        let pool = Arc::new(pool);
        {
            let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
            if pools.iter().any(|p| p.name() == pool.name()) {
                return Err(PoolError::DuplicatePool(pool.name().clone()));
            }
            pools.push(Arc::clone(&pool));
        }

        let warmed = pool.refill().await;
        info!(
            pool = %pool.name(),
            warmed,
            min_size = pool.settings().min_size,
            "Registered connection pool"
        );

        let health = tokio::spawn(Arc::clone(&pool).run_health_checks(
            self.health_check.interval,
            self.health_check.unhealthy_threshold,
            self.shutdown_tx.subscribe(),
        ));
        let cleanup = tokio::spawn(
            Arc::clone(&pool).run_cleanup(self.cleanup.interval, self.shutdown_tx.subscribe()),
        );
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([health, cleanup]);

        Ok(pool)
    }

    /// Look up a pool by name
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<Arc<NamedPool<C>>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.name().as_str() == name)
            .cloned()
    }

    /// Names of all pools in registration order
    #[must_use]
    pub fn pool_names(&self) -> Vec<String> {
        self.snapshot().iter().map(|p| p.name().to_string()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<NamedPool<C>>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pick the pool for an acquisition
    fn select(&self, name: Option<&str>) -> Result<Arc<NamedPool<C>>, PoolError> {
        if let Some(name) = name {
            return self
                .pool(name)
                .ok_or_else(|| PoolError::UnknownPool(name.to_string()));
        }

        let pools = self.snapshot();
        let loads = pools.iter().map(|p| PoolLoad {
            healthy: p.is_healthy(),
            in_use: p.in_use().get(),
            weight: p.weight(),
        });

        select_least_loaded(loads)
            .and_then(|index| pools.get(index).cloned())
            .ok_or(PoolError::PoolUnavailable {
                candidates: pools.len(),
            })
    }

    /// Borrow a connection from the named pool, or the least loaded healthy one
    ///
    /// Never waits: a full pool fails with [`PoolError::PoolExhausted`].
    /// Dropping the returned handle gives the connection back.
    pub async fn acquire(&self, name: Option<&str>) -> Result<PoolHandle<C>, PoolError> {
        let pool = self.select(name)?;
        debug!(pool = %pool.name(), "Acquiring connection");
        pool.acquire().await
    }

    /// Acquire a connection, run `op` with it, and release it afterwards
    ///
    /// The handle is released when `op`'s future finishes or is dropped. No
    /// retry is attempted on failure.
    pub async fn execute<F, Fut, T>(&self, name: Option<&str>, op: F) -> Result<T, PoolError>
    where
        F: FnOnce(PoolHandle<C>) -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self.acquire(name).await?;
        Ok(op(handle).await)
    }

    /// Status of one pool
    pub fn status(&self, name: &str) -> Result<PoolStats, PoolError> {
        self.pool(name)
            .map(|p| p.status())
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))
    }

    /// Status of every pool in registration order
    #[must_use]
    pub fn stats(&self) -> Vec<PoolStats> {
        self.snapshot().iter().map(|p| p.status()).collect()
    }

    /// Aggregate health across pools
    #[must_use]
    pub fn health_metrics(&self) -> HealthMetrics {
        self.stats()
            .iter()
            .fold(HealthMetrics::default(), |mut acc, stats| {
                acc.total_checks += stats.total_checks;
                acc.recovery_count += stats.recoveries;
                if stats.healthy {
                    acc.healthy_count += 1;
                } else {
                    acc.unhealthy_count += 1;
                }
                acc
            })
    }

    /// Run one health check on every pool now
    pub async fn check_health_now(&self) {
        for pool in self.snapshot() {
            pool.check_health(self.health_check.unhealthy_threshold)
                .await;
        }
    }

    /// Run one cleanup pass on every pool now
    pub async fn cleanup_now(&self) -> CleanupReport {
        let mut total = CleanupReport::default();
        for pool in self.snapshot() {
            let report = pool.cleanup().await;
            total.removed += report.removed;
            total.refilled += report.refilled;
        }
        total
    }

    /// Stop background loops and close every pool
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }

        for pool in self.snapshot() {
            pool.close();
        }
        info!("Connection pool manager shut down");
    }
}

impl<C: Connector> EmitMetrics for ConnectionPoolManager<C> {
    fn emit(&self, sink: &dyn MetricsSink) {
        for stats in self.stats() {
            stats.emit(sink);
        }
    }
}

impl<C: Connector> Drop for ConnectionPoolManager<C> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
