//! Test helpers for integration tests
//!
//! Mock connector, mock TCP servers and fast-ticking configurations shared
//! by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use swarm_perf::config::{CleanupConfig, HealthCheckConfig};
use swarm_perf::pool::{Connector, NamedPool};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Connection produced by [`MockConnector`]
#[derive(Debug)]
pub struct MockConn {
    pub serial: u64,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub connects: AtomicU64,
    pub pings: AtomicU64,
    pub fail_connect: AtomicBool,
    pub fail_ping: AtomicBool,
}

/// In-memory connector whose failures can be switched on and off
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.state.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u64 {
        self.state.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConn;

    async fn connect(&self) -> Result<MockConn> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        let serial = self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn { serial })
    }

    async fn ping(&self, _conn: &mut MockConn) -> Result<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_ping.load(Ordering::SeqCst) {
            anyhow::bail!("ping failed");
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}

/// Build a pool over `connector`
pub fn mock_pool(name: &str, connector: MockConnector, min: usize, max: usize) -> NamedPool<MockConnector> {
    NamedPool::builder(name, connector)
        .min_size(min)
        .max_size(max)
        .connect_timeout(Duration::from_millis(200))
        .probe_timeout(Duration::from_millis(100))
        .idle_timeout(Duration::from_millis(50))
        .build()
        .expect("pool builds")
}

/// Health checks every `interval`, one failure marks a pool unhealthy
pub fn fast_health(interval: Duration) -> HealthCheckConfig {
    HealthCheckConfig {
        interval,
        timeout: Duration::from_millis(100),
        unhealthy_threshold: 1,
    }
}

/// Health checks and cleanup that never fire during a test
pub fn quiet_health() -> HealthCheckConfig {
    fast_health(Duration::from_secs(3600))
}

pub fn quiet_cleanup() -> CleanupConfig {
    CleanupConfig {
        interval: Duration::from_secs(3600),
    }
}

/// Spawn a server answering every read with `+PONG\r\n`
///
/// Returns the bound port and the server task.
pub async fn spawn_pong_server() -> Result<(u16, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buffer = [0; 1024];
                loop {
                    match stream.read(&mut buffer).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if stream.write_all(b"+PONG\r\n").await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    Ok((port, handle))
}

/// A port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}
