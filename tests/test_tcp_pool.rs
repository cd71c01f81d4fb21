//! TCP pool integration tests
//!
//! Pools of real sockets against a local mock server answering `+PONG`.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use swarm_perf::config::{Config, PoolConfig, ProbeConfig};
use swarm_perf::memory::{MemorySample, MemorySampler};
use swarm_perf::pool::{ConnectionPoolManager, NamedPool, PoolError, Probe, TcpConnector};
use swarm_perf::{PerformanceLayer, RecordingSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod test_helpers;
use test_helpers::{closed_port, quiet_cleanup, quiet_health, spawn_pong_server};

struct Calm;

impl MemorySampler for Calm {
    fn sample(&self) -> Result<MemorySample> {
        Ok(MemorySample {
            used_bytes: 1,
            total_bytes: 100,
            process_bytes: 1,
        })
    }
}

#[tokio::test]
async fn test_tcp_pool_prewarms_and_probes() -> Result<()> {
    let (port, _server) = spawn_pong_server().await?;
    let connector = TcpConnector::new("127.0.0.1", port).with_probe(Probe::redis_ping());
    let manager = ConnectionPoolManager::new(quiet_health(), quiet_cleanup());
    manager
        .add_pool(NamedPool::builder("cache", connector).min_size(2).max_size(3).build()?)
        .await?;

    assert_eq!(manager.status("cache")?.size, 2);

    let mut conn = manager.acquire(Some("cache")).await?;
    conn.write_all(b"PING\r\n").await?;
    let mut reply = [0u8; 7];
    conn.read_exact(&mut reply).await?;
    assert_eq!(&reply, b"+PONG\r\n");
    drop(conn);

    manager.check_health_now().await;
    assert!(manager.status("cache")?.healthy);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_tcp_pool_connect_refused() -> Result<()> {
    let connector = TcpConnector::new("127.0.0.1", closed_port());
    let manager = ConnectionPoolManager::new(quiet_health(), quiet_cleanup());
    manager
        .add_pool(
            NamedPool::builder("db", connector)
                .min_size(1)
                .max_size(2)
                .connect_timeout(Duration::from_millis(500))
                .build()?,
        )
        .await?;

    // Pre-warm failed but the pool is registered
    assert_eq!(manager.status("db")?.size, 0);
    let err = manager.acquire(Some("db")).await.unwrap_err();
    assert!(matches!(err, PoolError::Connect { .. }), "got {err}");

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_layer_builds_pools_from_config() -> Result<()> {
    let (port, _server) = spawn_pong_server().await?;
    let mut config = Config::default();
    config.pools = vec![PoolConfig {
        min_size: 1,
        probe: Some(ProbeConfig {
            request: "PING\r\n".to_string(),
            expect: "+PONG".to_string(),
        }),
        ..PoolConfig::new("cache", "127.0.0.1", port)
    }];

    let sink = Arc::new(RecordingSink::default());
    let layer = Arc::new(PerformanceLayer::with_sampler(
        config,
        Arc::clone(&sink) as _,
        Arc::new(Calm),
    ));
    let pools = Arc::new(layer.tcp_pool_manager().await?);
    layer.register_metrics_source(Arc::clone(&pools) as _);

    assert_eq!(pools.pool_names(), vec!["cache".to_string()]);
    let handle = pools.acquire(None).await?;
    assert_eq!(handle.pool_name().as_str(), "cache");
    drop(handle);

    layer.emit_metrics();
    assert_eq!(sink.last_value_tagged("pool.size", "pool", "cache"), Some(1.0));

    pools.shutdown().await;
    layer.shutdown().await;
    Ok(())
}
