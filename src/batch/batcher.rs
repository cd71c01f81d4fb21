//! Adaptive message batcher
//!
//! Messages accumulate per channel and are flushed to the channel's processor
//! as one [`BatchedMessage`] when the queue reaches the effective batch size,
//! its oldest message reaches `max_batch_delay`, its byte estimate reaches
//! `compression_threshold`, or a `Critical` message arrives. A background
//! loop flushes queues that aged out without further traffic.
//!
//! Delivery is at-most-once: a batch whose processor fails is dropped.

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::adaptive::AdaptiveSizer;
use super::compression::{EncodedPayload, encode_payload};
use super::error::BatchError;
use super::message::{BatchedMessage, Priority};
use super::queue::BatchQueue;
use crate::config::BatcherConfig;
use crate::metrics::{EmitMetrics, MetricsSink};
use crate::types::ChannelName;

type Processor<M> =
    Arc<dyn Fn(BatchedMessage<M>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Default)]
struct BatcherCounters {
    messages_enqueued: AtomicU64,
    messages_flushed: AtomicU64,
    messages_dropped: AtomicU64,
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
    compressed_batches: AtomicU64,
    bytes_original: AtomicU64,
    bytes_sent: AtomicU64,
}

struct BatcherInner<M> {
    config: BatcherConfig,
    queues: DashMap<ChannelName, BatchQueue<M>>,
    processors: DashMap<ChannelName, Processor<M>>,
    sizers: DashMap<ChannelName, AdaptiveSizer>,
    counters: BatcherCounters,
    closed: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

/// Per-channel message batcher
///
/// Cloning is cheap and yields a handle to the same batcher.
pub struct MessageBatcher<M> {
    inner: Arc<BatcherInner<M>>,
}

impl<M> Clone for MessageBatcher<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> std::fmt::Debug for MessageBatcher<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBatcher")
            .field("config", &self.inner.config)
            .field("channels", &self.inner.queues.len())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<M> MessageBatcher<M>
where
    M: Serialize + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: BatcherConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(BatcherInner {
                config,
                queues: DashMap::new(),
                processors: DashMap::new(),
                sizers: DashMap::new(),
                counters: BatcherCounters::default(),
                closed: AtomicBool::new(false),
                shutdown_tx,
                flush_task: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    /// Register the processor for `channel`; a later registration replaces it
    pub fn register_processor<F, Fut>(&self, channel: impl Into<ChannelName>, processor: F)
    where
        F: Fn(BatchedMessage<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let channel = channel.into();
        let processor: Processor<M> = Arc::new(move |batch| processor(batch).boxed());
        if self
            .inner
            .processors
            .insert(channel.clone(), processor)
            .is_some()
        {
            warn!(channel = %channel, "Replacing batch processor");
        }
    }

    /// Queue `message` on `channel`, flushing first if a threshold is reached
    ///
    /// A flush triggered here completes before this returns; if it fails the
    /// batch is dropped and [`BatchError::Processing`] is returned.
    pub async fn add_message(
        &self,
        channel: impl Into<ChannelName>,
        message: M,
        priority: Priority,
    ) -> Result<(), BatchError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BatchError::Closed);
        }

        let channel = channel.into();
        if !self.inner.processors.contains_key(&channel) {
            return Err(BatchError::NoProcessor(channel));
        }

        let size = serde_json::to_vec(&message)?.len();
        let batch_size = self.channel_batch_size(&channel);
        let config = &self.inner.config;

        let should_flush = {
            let mut queue = self.inner.queues.entry(channel.clone()).or_default();
            queue.push(message, size, priority);
            queue.should_flush(batch_size, config.max_batch_delay, config.compression_threshold)
        };
        self.inner
            .counters
            .messages_enqueued
            .fetch_add(1, Ordering::Relaxed);

        if should_flush {
            self.flush(&channel).await?;
        }
        Ok(())
    }

    /// Flush whatever is queued on `channel`
    ///
    /// Returns the number of messages delivered.
    pub async fn flush(&self, channel: &ChannelName) -> Result<usize, BatchError> {
        let Some((_, queue)) = self.inner.queues.remove(channel) else {
            return Ok(0);
        };
        if queue.is_empty() {
            return Ok(0);
        }
        self.deliver(channel.clone(), queue.into_messages()).await
    }

    /// Flush every channel
    ///
    /// Failures are logged and counted; returns the messages delivered.
    pub async fn flush_all(&self) -> usize {
        let channels: Vec<ChannelName> = self.inner.queues.iter().map(|e| e.key().clone()).collect();
        self.flush_channels(channels).await
    }

    /// Flush channels whose oldest message reached `max_batch_delay`
    pub async fn flush_expired(&self) -> usize {
        let max_delay = self.inner.config.max_batch_delay;
        let expired: Vec<ChannelName> = self
            .inner
            .queues
            .iter()
            .filter(|e| e.value().is_expired(max_delay))
            .map(|e| e.key().clone())
            .collect();
        self.flush_channels(expired).await
    }

    async fn flush_channels(&self, channels: Vec<ChannelName>) -> usize {
        let mut delivered = 0;
        for channel in channels {
            if let Ok(count) = self.flush(&channel).await {
                delivered += count;
            }
        }
        delivered
    }

    async fn deliver(&self, channel: ChannelName, messages: Vec<M>) -> Result<usize, BatchError> {
        let counters = &self.inner.counters;
        let count = messages.len();

        let Some(processor) = self
            .inner
            .processors
            .get(&channel)
            .map(|p| Arc::clone(p.value()))
        else {
            counters
                .messages_dropped
                .fetch_add(count as u64, Ordering::Relaxed);
            warn!(channel = %channel, count, "Dropping batch for channel without processor");
            return Err(BatchError::NoProcessor(channel));
        };

        let payload = match self.encode(&messages) {
            Ok(payload) => payload,
            Err(e) => {
                counters
                    .messages_dropped
                    .fetch_add(count as u64, Ordering::Relaxed);
                counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                error!(channel = %channel, count, error = %e, "Failed to encode batch");
                return Err(e);
            }
        };

        counters
            .bytes_original
            .fetch_add(payload.original_size as u64, Ordering::Relaxed);
        counters
            .bytes_sent
            .fetch_add(payload.size() as u64, Ordering::Relaxed);
        if payload.compressed {
            counters.compressed_batches.fetch_add(1, Ordering::Relaxed);
        }

        let batch = BatchedMessage::new(channel.clone(), messages, payload);
        let batch_id = batch.id();
        debug!(
            channel = %channel,
            batch_id = %batch_id,
            count,
            bytes = batch.compressed_size(),
            compressed = batch.is_compressed(),
            "Flushing batch"
        );

        let started = Instant::now();
        let result = processor(batch).await;
        self.record_processing_time(&channel, started.elapsed());

        match result {
            Ok(()) => {
                counters.batches_flushed.fetch_add(1, Ordering::Relaxed);
                counters
                    .messages_flushed
                    .fetch_add(count as u64, Ordering::Relaxed);
                Ok(count)
            }
            Err(source) => {
                counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                counters
                    .messages_dropped
                    .fetch_add(count as u64, Ordering::Relaxed);
                error!(
                    channel = %channel,
                    batch_id = %batch_id,
                    count,
                    error = %source,
                    "Batch processor failed, batch dropped"
                );
                Err(BatchError::Processing {
                    channel,
                    batch_id,
                    source,
                })
            }
        }
    }

    fn encode(&self, messages: &[M]) -> Result<EncodedPayload, BatchError> {
        let json = serde_json::to_vec(messages)?;
        if self.inner.config.enable_compression {
            encode_payload(json, self.inner.config.compression_threshold)
        } else {
            Ok(EncodedPayload {
                original_size: json.len(),
                bytes: json,
                compressed: false,
            })
        }
    }

    fn record_processing_time(&self, channel: &ChannelName, elapsed: Duration) {
        if !self.inner.config.adaptive_sizing {
            return;
        }
        let max = self.inner.config.max_batch_size.get();
        let mut sizer = self
            .inner
            .sizers
            .entry(channel.clone())
            .or_insert_with(|| AdaptiveSizer::new(max));
        let before = sizer.effective();
        let after = sizer.record(elapsed);
        if before != after {
            debug!(channel = %channel, before, after, "Adjusted batch size");
        }
    }

    /// Effective batch size currently used for `channel`
    #[must_use]
    pub fn channel_batch_size(&self, channel: &ChannelName) -> usize {
        self.inner
            .sizers
            .get(channel)
            .map_or(self.inner.config.max_batch_size.get(), |s| s.effective())
    }

    /// Messages queued on `channel`
    #[must_use]
    pub fn pending(&self, channel: &ChannelName) -> usize {
        self.inner.queues.get(channel).map_or(0, |q| q.len())
    }

    /// Start the background flush loop; a second call is a no-op
    pub fn start(&self) {
        let mut task = self
            .inner
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let interval = self.inner.config.flush_interval;
        *task = Some(tokio::spawn(run_flush_loop(
            Arc::downgrade(&self.inner),
            interval,
            self.inner.shutdown_tx.subscribe(),
        )));
        info!(interval = ?interval, "Batch flush loop started");
    }

    /// Reject new messages, stop the flush loop and flush what remains
    ///
    /// Returns the number of messages delivered by the final flush.
    pub async fn shutdown(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.inner.shutdown_tx.send(());

        let task = self
            .inner
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let delivered = self.flush_all().await;
        info!(delivered, "Batcher shut down");
        delivered
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> BatcherStats {
        let c = &self.inner.counters;
        BatcherStats {
            channels: self.inner.queues.len(),
            pending_messages: self.inner.queues.iter().map(|e| e.value().len()).sum(),
            messages_enqueued: c.messages_enqueued.load(Ordering::Relaxed),
            messages_flushed: c.messages_flushed.load(Ordering::Relaxed),
            messages_dropped: c.messages_dropped.load(Ordering::Relaxed),
            batches_flushed: c.batches_flushed.load(Ordering::Relaxed),
            batches_failed: c.batches_failed.load(Ordering::Relaxed),
            compressed_batches: c.compressed_batches.load(Ordering::Relaxed),
            bytes_original: c.bytes_original.load(Ordering::Relaxed),
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

impl<M> EmitMetrics for MessageBatcher<M>
where
    M: Serialize + Send + Sync + 'static,
{
    fn emit(&self, sink: &dyn MetricsSink) {
        self.stats().emit(sink);
    }
}

async fn run_flush_loop<M>(
    inner: Weak<BatcherInner<M>>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    M: Serialize + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let flushed = MessageBatcher { inner }.flush_expired().await;
                if flushed > 0 {
                    debug!(flushed, "Flushed expired batches");
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Batch flush loop shutting down");
                break;
            }
        }
    }
}

/// Snapshot of batcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Channels with queued messages
    pub channels: usize,
    pub pending_messages: usize,
    pub messages_enqueued: u64,
    pub messages_flushed: u64,
    pub messages_dropped: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub compressed_batches: u64,
    pub bytes_original: u64,
    pub bytes_sent: u64,
}

impl BatcherStats {
    /// Bytes sent over bytes before compression; 1.0 when nothing was sent
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_original == 0 {
            1.0
        } else {
            self.bytes_sent as f64 / self.bytes_original as f64
        }
    }
}

impl EmitMetrics for BatcherStats {
    fn emit(&self, sink: &dyn MetricsSink) {
        sink.record("batcher.pending_messages", self.pending_messages as f64, &[]);
        sink.record("batcher.messages_enqueued", self.messages_enqueued as f64, &[]);
        sink.record("batcher.messages_flushed", self.messages_flushed as f64, &[]);
        sink.record("batcher.messages_dropped", self.messages_dropped as f64, &[]);
        sink.record("batcher.batches_flushed", self.batches_flushed as f64, &[]);
        sink.record("batcher.batches_failed", self.batches_failed as f64, &[]);
        sink.record("batcher.compression_ratio", self.compression_ratio(), &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchSize;

    type Delivered = Arc<Mutex<Vec<Vec<u32>>>>;

    fn config(max: usize, delay_ms: u64) -> BatcherConfig {
        BatcherConfig {
            max_batch_size: BatchSize::new(max).unwrap(),
            max_batch_delay: Duration::from_millis(delay_ms),
            flush_interval: Duration::from_millis(20),
            ..BatcherConfig::default()
        }
    }

    fn collecting(batcher: &MessageBatcher<u32>, channel: &str) -> Delivered {
        let delivered: Delivered = Arc::default();
        let sink = Arc::clone(&delivered);
        batcher.register_processor(channel, move |batch: BatchedMessage<u32>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(batch.into_messages());
                Ok(())
            }
        });
        delivered
    }

    #[tokio::test]
    async fn test_no_processor() {
        let batcher = MessageBatcher::<u32>::new(config(3, 1000));
        let err = batcher
            .add_message("nobody", 1, Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::NoProcessor(_)));
    }

    #[tokio::test]
    async fn test_flush_on_size() {
        let batcher = MessageBatcher::new(config(3, 10_000));
        let delivered = collecting(&batcher, "prices");

        for i in 0..3 {
            batcher.add_message("prices", i, Priority::Normal).await.unwrap();
        }

        assert_eq!(*delivered.lock().unwrap(), vec![vec![0, 1, 2]]);
        assert_eq!(batcher.pending(&ChannelName::from("prices")), 0);
        assert_eq!(batcher.stats().batches_flushed, 1);
    }

    #[tokio::test]
    async fn test_critical_flushes_immediately() {
        let batcher = MessageBatcher::new(config(100, 10_000));
        let delivered = collecting(&batcher, "alerts");

        batcher.add_message("alerts", 1, Priority::Low).await.unwrap();
        assert!(delivered.lock().unwrap().is_empty());
        batcher.add_message("alerts", 2, Priority::Critical).await.unwrap();

        assert_eq!(*delivered.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_processor_failure_drops_batch() {
        let batcher = MessageBatcher::new(config(2, 10_000));
        batcher.register_processor("db", |_batch: BatchedMessage<u32>| async {
            Err(anyhow::anyhow!("database unavailable"))
        });

        batcher.add_message("db", 1, Priority::Normal).await.unwrap();
        let err = batcher
            .add_message("db", 2, Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Processing { .. }));

        let stats = batcher.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.messages_dropped, 2);
        assert_eq!(stats.pending_messages, 0);
    }

    #[tokio::test]
    async fn test_background_loop_flushes_expired() {
        let batcher = MessageBatcher::new(config(100, 50));
        let delivered = collecting(&batcher, "ws");
        batcher.start();

        batcher.add_message("ws", 7, Priority::Normal).await.unwrap();
        batcher.add_message("ws", 8, Priority::Normal).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*delivered.lock().unwrap(), vec![vec![7, 8]]);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_rejects() {
        let batcher = MessageBatcher::new(config(100, 10_000));
        let delivered = collecting(&batcher, "ws");
        batcher.start();
        batcher.add_message("ws", 1, Priority::Normal).await.unwrap();

        assert_eq!(batcher.shutdown().await, 1);
        assert_eq!(*delivered.lock().unwrap(), vec![vec![1]]);
        assert!(batcher.is_closed());
        assert!(matches!(
            batcher.add_message("ws", 2, Priority::Normal).await,
            Err(BatchError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_reregister_replaces_processor() {
        let batcher = MessageBatcher::new(config(1, 10_000));
        let first = collecting(&batcher, "ch");
        let second = collecting(&batcher, "ch");

        batcher.add_message("ch", 5, Priority::Normal).await.unwrap();
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec![vec![5]]);
    }

    #[tokio::test]
    async fn test_flush_on_bytes() {
        let mut cfg = config(100, 10_000);
        cfg.compression_threshold = 16;
        let batcher = MessageBatcher::<String>::new(cfg);
        let sizes: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();
        let s = Arc::clone(&sizes);
        batcher.register_processor("big", move |batch: BatchedMessage<String>| {
            let s = Arc::clone(&s);
            async move {
                s.lock()
                    .unwrap()
                    .push((batch.len(), batch.original_size()));
                Ok(())
            }
        });

        batcher
            .add_message("big", "x".repeat(32), Priority::Normal)
            .await
            .unwrap();
        let sizes = sizes.lock().unwrap();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0], (1, 36));
    }

    #[tokio::test]
    async fn test_stats_compression_ratio_default() {
        let batcher = MessageBatcher::<u32>::new(BatcherConfig::default());
        assert_eq!(batcher.stats().compression_ratio(), 1.0);
        assert_eq!(
            batcher.channel_batch_size(&ChannelName::from("any")),
            BatchSize::DEFAULT.get()
        );
    }
}
