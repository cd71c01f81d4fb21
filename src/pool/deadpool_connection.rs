//! deadpool integration
//!
//! [`ConnectorManager`] adapts any [`Connector`] to deadpool's managed pool:
//! new connections are opened under `connect_timeout`, idle connections are
//! pinged under `probe_timeout` before being handed out, and entries marked
//! unhealthy are discarded. [`PoolHandle`] is the scoped borrow returned to
//! callers.

use deadpool::managed;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use super::connector::Connector;
use crate::types::PoolName;

/// Lock-free counters shared by a pool, its manager and its handles
#[derive(Debug, Default)]
pub struct PoolCounters {
    next_id: AtomicU64,
    created: AtomicU64,
    discarded: AtomicU64,
    failed_connections: AtomicU64,
    exhaustion_count: AtomicU64,
    acquisitions: AtomicU64,
    unhealthy_transitions: AtomicU64,
}

impl PoolCounters {
    #[inline]
    pub(crate) fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed_connection(&self) {
        self.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_exhaustion(&self) {
        self.exhaustion_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_unhealthy_transition(&self) {
        self.unhealthy_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn failed_connections(&self) -> u64 {
        self.failed_connections.load(Ordering::Relaxed)
    }

    pub fn exhaustion_count(&self) -> u64 {
        self.exhaustion_count.load(Ordering::Relaxed)
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub fn unhealthy_transitions(&self) -> u64 {
        self.unhealthy_transitions.load(Ordering::Relaxed)
    }
}

/// One physical connection owned by a pool
#[derive(Debug)]
pub struct PooledConnection<T> {
    id: u64,
    created_at: Instant,
    healthy: bool,
    conn: T,
}

impl<T> PooledConnection<T> {
    /// Monotonic identity within the pool
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }
}

/// deadpool manager backed by a [`Connector`]
#[derive(Debug)]
pub struct ConnectorManager<C: Connector> {
    connector: C,
    pool_name: PoolName,
    connect_timeout: Duration,
    probe_timeout: Duration,
    counters: Arc<PoolCounters>,
}

impl<C: Connector> ConnectorManager<C> {
    pub fn new(
        connector: C,
        pool_name: PoolName,
        connect_timeout: Duration,
        probe_timeout: Duration,
        counters: Arc<PoolCounters>,
    ) -> Self {
        Self {
            connector,
            pool_name,
            connect_timeout,
            probe_timeout,
            counters,
        }
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Ping `conn` under the probe timeout
    pub async fn probe(&self, conn: &mut C::Connection) -> anyhow::Result<()> {
        tokio::time::timeout(self.probe_timeout, self.connector.ping(conn))
            .await
            .map_err(|_| anyhow::anyhow!("probe timed out after {:?}", self.probe_timeout))?
    }
}

impl<C: Connector> managed::Manager for ConnectorManager<C> {
    type Type = PooledConnection<C::Connection>;
    type Error = anyhow::Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        debug!(
            pool = %self.pool_name,
            endpoint = %self.connector.endpoint(),
            "Creating new pooled connection"
        );

        let conn = tokio::time::timeout(self.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| anyhow::anyhow!("connect timed out after {:?}", self.connect_timeout))??;

        let id = self.counters.next_id.fetch_add(1, Ordering::Relaxed);
        self.counters.created.fetch_add(1, Ordering::Relaxed);

        Ok(PooledConnection {
            id,
            created_at: Instant::now(),
            healthy: true,
            conn,
        })
    }

    async fn recycle(
        &self,
        entry: &mut Self::Type,
        _: &managed::Metrics,
    ) -> managed::RecycleResult<Self::Error> {
        if !entry.healthy {
            self.counters.record_discarded(1);
            return Err(managed::RecycleError::Message(
                "connection marked unhealthy".into(),
            ));
        }

        if let Err(e) = self.probe(&mut entry.conn).await {
            self.counters.record_failed_connection();
            self.counters.record_discarded(1);
            debug!(
                pool = %self.pool_name,
                connection_id = entry.id,
                error = %e,
                "Discarding idle connection that failed its probe"
            );
            return Err(managed::RecycleError::Backend(e));
        }

        Ok(())
    }
}

pub(crate) type Pool<C> = managed::Pool<ConnectorManager<C>>;

/// Scoped borrow of a pooled connection
///
/// Dereferences to the underlying connection. Dropping the handle returns
/// the connection to its pool, unless it was marked unhealthy, in which case
/// it is closed and removed.
pub struct PoolHandle<C: Connector> {
    object: Option<managed::Object<ConnectorManager<C>>>,
    pool_name: PoolName,
    counters: Arc<PoolCounters>,
}

impl<C: Connector> PoolHandle<C> {
    pub(crate) fn new(
        object: managed::Object<ConnectorManager<C>>,
        pool_name: PoolName,
        counters: Arc<PoolCounters>,
    ) -> Self {
        Self {
            object: Some(object),
            pool_name,
            counters,
        }
    }

    /// Name of the pool this connection belongs to
    #[must_use]
    pub fn pool_name(&self) -> &PoolName {
        &self.pool_name
    }

    /// Pool-unique id of the borrowed connection
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry().id
    }

    /// Flag the connection as broken so it is discarded on release
    pub fn mark_unhealthy(&mut self) {
        self.entry_mut().healthy = false;
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.entry().healthy
    }

    fn entry(&self) -> &PooledConnection<C::Connection> {
        match &self.object {
            Some(object) => &**object,
            None => unreachable!("pool handle used after release"),
        }
    }

    fn entry_mut(&mut self) -> &mut PooledConnection<C::Connection> {
        match &mut self.object {
            Some(object) => &mut **object,
            None => unreachable!("pool handle used after release"),
        }
    }
}

impl<C: Connector> Deref for PoolHandle<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        &self.entry().conn
    }
}

impl<C: Connector> DerefMut for PoolHandle<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry_mut().conn
    }
}

impl<C: Connector> std::fmt::Debug for PoolHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("pool", &self.pool_name)
            .field("id", &self.object.as_ref().map(|o| o.id))
            .finish()
    }
}

impl<C: Connector> Drop for PoolHandle<C> {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        if object.healthy {
            // Returned to the idle list by deadpool
            return;
        }

        let entry = managed::Object::take(object);
        self.counters.record_discarded(1);
        debug!(
            pool = %self.pool_name,
            connection_id = entry.id,
            "Discarded connection marked unhealthy"
        );
    }
}
