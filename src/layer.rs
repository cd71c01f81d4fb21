//! Composition root
//!
//! [`PerformanceLayer`] is built once at process start. It owns the
//! concurrency controller, the memory manager and the metrics sink, and hands
//! out pool managers and batchers configured from the same [`Config`].

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::batch::MessageBatcher;
use crate::concurrency::ConcurrencyController;
use crate::config::Config;
use crate::memory::{MemoryManager, MemorySampler, SysinfoSampler};
use crate::metrics::{EmitMetrics, MetricsSink};
use crate::pool::{
    ConnectionPoolManager, Connector, NamedPool, PoolError, PoolSettings, Probe, TcpConnector,
};

/// Something the metrics reporter emits on every tick
pub type MetricsSource = Arc<dyn EmitMetrics + Send + Sync>;

/// Process-wide performance layer
pub struct PerformanceLayer {
    config: Config,
    controller: ConcurrencyController,
    memory: MemoryManager,
    sink: Arc<dyn MetricsSink>,
    sources: Mutex<Vec<MetricsSource>>,
    shutdown_tx: broadcast::Sender<()>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PerformanceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceLayer")
            .field("config", &self.config)
            .field("controller", &self.controller)
            .field("memory", &self.memory)
            .finish()
    }
}

impl PerformanceLayer {
    /// Build the layer with a `sysinfo` memory sampler
    pub fn new(config: Config, sink: Arc<dyn MetricsSink>) -> anyhow::Result<Self> {
        let sampler = Arc::new(SysinfoSampler::new()?);
        Ok(Self::with_sampler(config, sink, sampler))
    }

    #[must_use]
    pub fn with_sampler(
        config: Config,
        sink: Arc<dyn MetricsSink>,
        sampler: Arc<dyn MemorySampler>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            controller: ConcurrencyController::new(&config.concurrency),
            memory: MemoryManager::new(config.memory.clone(), sampler),
            config,
            sink,
            sources: Mutex::new(Vec::new()),
            shutdown_tx,
            reporter: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn controller(&self) -> &ConcurrencyController {
        &self.controller
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    /// An empty pool manager using the configured health and cleanup settings
    #[must_use]
    pub fn pool_manager<C: Connector>(&self) -> ConnectionPoolManager<C> {
        ConnectionPoolManager::new(self.config.health_check.clone(), self.config.cleanup.clone())
    }

    /// A pool manager with one TCP pool per configured endpoint
    pub async fn tcp_pool_manager(&self) -> Result<ConnectionPoolManager<TcpConnector>, PoolError> {
        let manager = self.pool_manager();
        for pool_config in &self.config.pools {
            let mut connector = TcpConnector::new(pool_config.host.clone(), pool_config.port)
                .with_probe_timeout(self.config.health_check.timeout);
            if let Some(probe) = &pool_config.probe {
                connector = connector.with_probe(Probe::from(probe));
            }

            let pool = NamedPool::builder(pool_config.name.clone(), connector)
                .settings(PoolSettings::from_config(pool_config, &self.config.health_check))
                .build()?;
            manager.add_pool(pool).await?;
        }
        Ok(manager)
    }

    /// A batcher using the configured batching settings
    #[must_use]
    pub fn batcher<M>(&self) -> MessageBatcher<M>
    where
        M: Serialize + Send + Sync + 'static,
    {
        MessageBatcher::new(self.config.batcher.clone())
    }

    /// Include `source` in every metrics report
    pub fn register_metrics_source(&self, source: MetricsSource) {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source);
    }

    /// Emit one report of every component into the sink
    pub fn emit_metrics(&self) {
        let sink = self.sink.as_ref();
        self.controller.metrics_snapshot().emit(sink);
        self.memory.stats().emit(sink);

        let sources = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for source in sources {
            source.emit(sink);
        }
    }

    /// Start the memory monitor and the metrics reporter
    pub fn start(self: &Arc<Self>) {
        self.memory.start_monitoring();
        self.spawn_metrics_reporter();
    }

    /// Periodically emit controller, memory and registered snapshots
    ///
    /// A second call is a no-op while the reporter runs.
    pub fn spawn_metrics_reporter(self: &Arc<Self>) {
        let mut reporter = self
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if reporter.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let layer = Arc::downgrade(self);
        let period = self.config.metrics.report_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *reporter = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(layer) = layer.upgrade() else {
                            break;
                        };
                        layer.emit_metrics();
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Metrics reporter shutting down");
                        break;
                    }
                }
            }
        }));
        info!(interval = ?period, "Metrics reporter started");
    }

    /// Stop background tasks and close the controller's semaphores
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let reporter = self
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = reporter
            && let Err(e) = task.await
        {
            warn!(error = %e, "Metrics reporter task failed");
        }

        self.memory.shutdown().await;
        self.emit_metrics();
        self.controller.shutdown();
        info!("Performance layer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySample;
    use crate::metrics::RecordingSink;
    use std::time::Duration;

    struct Quiet;

    impl MemorySampler for Quiet {
        fn sample(&self) -> anyhow::Result<MemorySample> {
            Ok(MemorySample {
                used_bytes: 10,
                total_bytes: 100,
                process_bytes: 1,
            })
        }
    }

    fn layer(sink: Arc<RecordingSink>) -> PerformanceLayer {
        PerformanceLayer::with_sampler(Config::default(), sink, Arc::new(Quiet))
    }

    #[tokio::test]
    async fn test_emit_metrics_includes_sources() {
        let sink = Arc::new(RecordingSink::default());
        let layer = layer(Arc::clone(&sink));
        let batcher = layer.batcher::<u32>();
        layer.register_metrics_source(Arc::new(batcher));

        layer.emit_metrics();
        assert!(sink.last_value("async.total_operations").is_some());
        assert!(sink.last_value("memory.alerts").is_some());
        assert!(sink.last_value("batcher.messages_enqueued").is_some());
    }

    #[tokio::test]
    async fn test_reporter_emits_periodically() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = Config::default();
        config.metrics.report_interval = Duration::from_millis(20);
        let layer = Arc::new(PerformanceLayer::with_sampler(
            config,
            Arc::clone(&sink) as Arc<dyn MetricsSink>,
            Arc::new(Quiet),
        ));

        layer.spawn_metrics_reporter();
        tokio::time::sleep(Duration::from_millis(80)).await;
        layer.shutdown().await;

        assert!(sink.last_value("async.total_operations").is_some());
    }

    #[tokio::test]
    async fn test_tcp_pool_manager_without_pools() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = Config::default();
        config.pools.clear();
        let layer = PerformanceLayer::with_sampler(config, sink, Arc::new(Quiet));

        let manager = layer.tcp_pool_manager().await.unwrap();
        assert!(manager.pool_names().is_empty());
        assert!(manager.acquire(None).await.unwrap_err().is_unavailable());
        manager.shutdown().await;
    }
}
