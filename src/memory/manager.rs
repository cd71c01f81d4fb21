//! Memory manager
//!
//! Registry of object pools plus the tracking registry, supervised by a
//! periodic monitor. Every tick sweeps the tracking registry. Above the
//! alert threshold pressure callbacks run and a collection pass follows;
//! above the emergency threshold every pool is also shrunk to its minimum
//! and leak detection runs.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::object_pool::{ManagedPool, ObjectPool, ObjectPoolStats, Resettable};
use super::sampler::{MemorySample, MemorySampler, SysinfoSampler};
use super::tracking::{TrackHandle, TrackingRegistry};
use crate::config::MemoryConfig;
use crate::constants::memory::LEAK_REPORT_TOP_N;
use crate::metrics::{EmitMetrics, MetricsSink};

type PressureCallback = Arc<dyn Fn(&MemorySample) + Send + Sync>;

/// Outcome of one memory check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Alert,
    Emergency,
}

/// Result of one collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Tracked objects whose reclaim callback ran
    pub reclaimed: usize,
    /// Idle pool values dropped
    pub trimmed: usize,
}

#[derive(Debug, Default)]
struct MemoryCounters {
    samples: AtomicU64,
    sample_failures: AtomicU64,
    alerts: AtomicU64,
    emergencies: AtomicU64,
    collections: AtomicU64,
    leaks_detected: AtomicU64,
}

struct MemoryInner {
    config: MemoryConfig,
    sampler: Arc<dyn MemorySampler>,
    pools: DashMap<String, Arc<dyn ManagedPool>>,
    callbacks: Mutex<Vec<PressureCallback>>,
    tracking: TrackingRegistry,
    last_sample: Mutex<Option<MemorySample>>,
    counters: MemoryCounters,
    shutdown_tx: broadcast::Sender<()>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Supervisor of object pools and tracked objects
///
/// Cloning is cheap and yields a handle to the same manager.
#[derive(Clone)]
pub struct MemoryManager {
    inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.inner.config)
            .field("pools", &self.inner.pools.len())
            .field("tracked", &self.inner.tracking.len())
            .finish()
    }
}

impl MemoryManager {
    #[must_use]
    pub fn new(config: MemoryConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(MemoryInner {
                config,
                sampler,
                pools: DashMap::new(),
                callbacks: Mutex::new(Vec::new()),
                tracking: TrackingRegistry::new(),
                last_sample: Mutex::new(None),
                counters: MemoryCounters::default(),
                shutdown_tx,
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Create a manager reading real memory figures
    pub fn with_system_sampler(config: MemoryConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config, Arc::new(SysinfoSampler::new()?)))
    }

    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Create and register an object pool pre-filled to `min_size`
    ///
    /// A pool already registered under `name` is replaced.
    pub fn create_pool<T, F>(
        &self,
        name: impl Into<String>,
        factory: F,
        min_size: usize,
        max_size: usize,
    ) -> ObjectPool<T>
    where
        T: Resettable + Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let pool = ObjectPool::new(name, factory, min_size, max_size);
        let prefilled = pool.refill();
        let name = pool.name().to_string();

        if self
            .inner
            .pools
            .insert(name.clone(), Arc::new(pool.clone()))
            .is_some()
        {
            warn!(pool = %name, "Replacing existing object pool");
        }
        debug!(pool = %name, prefilled, max_size = pool.max_size(), "Created object pool");
        pool
    }

    /// Unregister a pool; existing handles keep working
    pub fn remove_pool(&self, name: &str) -> bool {
        self.inner.pools.remove(name).is_some()
    }

    /// Names of registered pools, sorted
    #[must_use]
    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.pools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Run `callback` with the sample whenever usage exceeds the alert threshold
    pub fn register_pressure_callback<F>(&self, callback: F)
    where
        F: Fn(&MemorySample) + Send + Sync + 'static,
    {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Track a shared object; `on_reclaim` runs on the first sweep after it is dropped
    pub fn track<T, F>(&self, object: &Arc<T>, on_reclaim: F) -> TrackHandle
    where
        T: Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.inner.tracking.track(object, on_reclaim)
    }

    pub fn untrack(&self, handle: TrackHandle) -> bool {
        self.inner.tracking.untrack(handle)
    }

    /// Tracked objects still registered
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.tracking.len()
    }

    /// Sweep the tracking registry and drop half of every pool's idle surplus
    pub fn collect(&self) -> CollectionReport {
        let reclaimed = self.inner.tracking.sweep();
        let trimmed = self.pools().iter().map(|p| p.trim_surplus()).sum();
        self.inner.counters.collections.fetch_add(1, Ordering::Relaxed);
        debug!(reclaimed, trimmed, "Collection pass complete");
        CollectionReport { reclaimed, trimmed }
    }

    /// Shrink every pool to `min_size`
    ///
    /// Returns the number of idle values dropped.
    pub fn emergency_shrink(&self) -> usize {
        self.pools().iter().map(|p| p.shrink_to_min()).sum()
    }

    fn pools(&self) -> Vec<Arc<dyn ManagedPool>> {
        self.inner
            .pools
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Sweep tracked objects, then sample memory once and react to pressure
    pub fn check_memory(&self) -> anyhow::Result<MemoryPressure> {
        let reclaimed = self.inner.tracking.sweep();
        if reclaimed > 0 {
            debug!(reclaimed, "Reclaimed dropped tracked objects");
        }

        let sample = match self.inner.sampler.sample() {
            Ok(sample) => sample,
            Err(e) => {
                self.inner
                    .counters
                    .sample_failures
                    .fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        self.inner.counters.samples.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .inner
            .last_sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sample);

        let usage = sample.percent_used();
        let config = &self.inner.config;
        if !config.alert_threshold_percent.is_exceeded_by(usage) {
            return Ok(MemoryPressure::Normal);
        }

        self.inner.counters.alerts.fetch_add(1, Ordering::Relaxed);
        warn!(
            usage_percent = usage,
            threshold = %config.alert_threshold_percent,
            "Memory usage above alert threshold"
        );
        self.run_callbacks(&sample);
        self.collect();

        if !config.emergency_threshold_percent.is_exceeded_by(usage) {
            return Ok(MemoryPressure::Alert);
        }

        self.inner
            .counters
            .emergencies
            .fetch_add(1, Ordering::Relaxed);
        let dropped = self.emergency_shrink();
        error!(
            usage_percent = usage,
            threshold = %config.emergency_threshold_percent,
            dropped,
            "Memory usage above emergency threshold, pools shrunk to minimum"
        );
        if let Some(previous) = previous {
            self.detect_leak(&previous, &sample);
        }

        Ok(MemoryPressure::Emergency)
    }

    fn run_callbacks(&self, sample: &MemorySample) {
        let callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(sample);
        }
    }

    /// Growth heuristic: flags a suspected leak, not a proven one
    fn detect_leak(&self, previous: &MemorySample, current: &MemorySample) -> bool {
        let growth = current.growth_since(previous);
        if growth <= self.inner.config.leak_threshold_bytes {
            return false;
        }

        self.inner
            .counters
            .leaks_detected
            .fetch_add(1, Ordering::Relaxed);

        let mut pools: Vec<ObjectPoolStats> = self.pools().iter().map(|p| p.stats()).collect();
        pools.sort_by(|a, b| b.idle.cmp(&a.idle));
        let largest_pools: Vec<String> = pools
            .iter()
            .take(LEAK_REPORT_TOP_N)
            .map(|p| format!("{}={}", p.name, p.idle))
            .collect();
        let tracked: Vec<String> = self
            .inner
            .tracking
            .counts_by_type()
            .into_iter()
            .take(LEAK_REPORT_TOP_N)
            .map(|(type_name, count)| format!("{type_name}={count}"))
            .collect();

        warn!(
            growth_bytes = growth,
            largest_pools = ?largest_pools,
            tracked_objects = ?tracked,
            "Possible memory leak detected"
        );
        true
    }

    /// Start the background monitor; a second call is a no-op
    pub fn start_monitoring(&self) {
        let mut monitor = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if monitor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let manager = self.clone();
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        *monitor = Some(tokio::spawn(manager.run_monitor(shutdown_rx)));
        info!(
            interval = ?self.inner.config.monitor_interval,
            "Memory monitor started"
        );
    }

    async fn run_monitor(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.inner.config.monitor_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_memory() {
                        warn!(error = %e, "Memory sampling failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Memory monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Stop the background monitor and wait for it to exit
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(());
        let task = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let counters = &self.inner.counters;
        let mut pools: Vec<_> = self.pools().iter().map(|p| p.stats()).collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));

        MemoryStats {
            last_sample: *self
                .inner
                .last_sample
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            pools,
            tracked_objects: self.inner.tracking.len(),
            samples: counters.samples.load(Ordering::Relaxed),
            sample_failures: counters.sample_failures.load(Ordering::Relaxed),
            alerts: counters.alerts.load(Ordering::Relaxed),
            emergencies: counters.emergencies.load(Ordering::Relaxed),
            collections: counters.collections.load(Ordering::Relaxed),
            memory_leaks_detected: counters.leaks_detected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the memory manager
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStats {
    pub last_sample: Option<MemorySample>,
    pub pools: Vec<ObjectPoolStats>,
    pub tracked_objects: usize,
    pub samples: u64,
    pub sample_failures: u64,
    pub alerts: u64,
    pub emergencies: u64,
    pub collections: u64,
    pub memory_leaks_detected: u64,
}

impl EmitMetrics for MemoryStats {
    fn emit(&self, sink: &dyn MetricsSink) {
        if let Some(sample) = &self.last_sample {
            sink.record("memory.percent_used", sample.percent_used(), &[]);
            sink.record("memory.process_bytes", sample.process_bytes as f64, &[]);
        }
        sink.record("memory.tracked_objects", self.tracked_objects as f64, &[]);
        sink.record("memory.alerts", self.alerts as f64, &[]);
        sink.record("memory.emergencies", self.emergencies as f64, &[]);
        sink.record("memory.collections", self.collections as f64, &[]);
        sink.record("memory.leaks_detected", self.memory_leaks_detected as f64, &[]);
        for pool in &self.pools {
            pool.emit(sink);
        }
    }
}
