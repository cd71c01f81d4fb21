//! Connection factories for pools
//!
//! A [`Connector`] knows how to open a connection to one endpoint and how to
//! verify that an existing connection is still usable. Pools are generic over
//! it, so the cache store, the database and plain TCP services share the same
//! pooling code.

use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

use super::health_check::{Probe, check_probe_response, check_tcp_alive};
use crate::constants::health::DEFAULT_PROBE_TIMEOUT;
use crate::constants::pool::{KEEPALIVE_INTERVAL, KEEPALIVE_TIME};

/// Opens and validates connections for a pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The pooled connection type
    type Connection: Send + 'static;

    /// Open a new connection
    async fn connect(&self) -> Result<Self::Connection>;

    /// Verify that `conn` can still be used
    async fn ping(&self, conn: &mut Self::Connection) -> Result<()>;

    /// Human readable endpoint description used in logs
    fn endpoint(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Connector for plain TCP endpoints
///
/// Connections are tuned with `TCP_NODELAY` and keepalive. Without a
/// [`Probe`], liveness is a non-blocking peek; with one, the request is sent
/// and the reply prefix is checked.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    probe: Option<Probe>,
    probe_timeout: std::time::Duration,
}

impl TcpConnector {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            probe: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Use an application-level probe for liveness checks
    #[must_use]
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Deadline for one application-level probe exchange
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve the endpoint and open a tuned TCP stream
    async fn create_optimized_tcp_stream(&self) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr).await?.collect();

        let Some(socket_addr) = socket_addrs.first().copied() else {
            return Err(anyhow::anyhow!("No addresses found for {}", addr));
        };

        let stream = TcpStream::connect(socket_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", addr, e))?;

        stream.set_nodelay(true)?;

        // Start probing after 60s idle, then every 10s
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(KEEPALIVE_TIME)
            .with_interval(KEEPALIVE_INTERVAL);
        socket2::SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

        Ok(stream)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        debug!("Creating new TCP connection to {}:{}", self.host, self.port);
        self.create_optimized_tcp_stream().await
    }

    async fn ping(&self, conn: &mut TcpStream) -> Result<()> {
        check_tcp_alive(conn)?;
        if let Some(probe) = &self.probe {
            check_probe_response(conn, probe, self.probe_timeout).await?;
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
