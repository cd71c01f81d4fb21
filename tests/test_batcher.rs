//! Message batcher integration tests
//!
//! Time-based flushing through the background loop, ordering within a
//! batch, and the compression keep-or-discard rule.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use swarm_perf::batch::{BatchedMessage, MessageBatcher, Priority, inflate};
use swarm_perf::config::BatcherConfig;
use swarm_perf::types::{BatchSize, ChannelName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PriceTick {
    mint: String,
    price: f64,
}

fn tick(mint: &str, price: f64) -> PriceTick {
    PriceTick {
        mint: mint.to_string(),
        price,
    }
}

type Delivered<M> = Arc<Mutex<Vec<(Instant, BatchedMessage<M>)>>>;

fn record<M>(batcher: &MessageBatcher<M>, channel: &str) -> Delivered<M>
where
    M: Serialize + Send + Sync + 'static,
{
    let delivered: Delivered<M> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    batcher.register_processor(channel, move |batch: BatchedMessage<M>| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push((Instant::now(), batch));
            Ok(())
        }
    });
    delivered
}

/// Two messages under a size-3 limit are delivered together once the delay elapses
#[tokio::test]
async fn test_partial_batch_flushes_after_max_delay() -> Result<()> {
    let batcher = MessageBatcher::new(BatcherConfig {
        max_batch_size: BatchSize::new(3).unwrap(),
        max_batch_delay: Duration::from_millis(500),
        flush_interval: Duration::from_millis(50),
        ..BatcherConfig::default()
    });
    let delivered = record(&batcher, "prices");
    batcher.start();

    let started = Instant::now();
    batcher
        .add_message("prices", tick("So1", 1.0), Priority::Normal)
        .await?;
    batcher
        .add_message("prices", tick("So2", 2.0), Priority::Normal)
        .await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(delivered.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    {
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let (at, batch) = &delivered[0];
        let elapsed = at.duration_since(started);
        assert!(
            elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(650),
            "flushed after {elapsed:?}"
        );
        assert_eq!(batch.messages(), &[tick("So1", 1.0), tick("So2", 2.0)]);
        assert_eq!(batch.channel().as_str(), "prices");
    }

    batcher.shutdown().await;
    Ok(())
}

/// Channels are batched independently
#[tokio::test]
async fn test_channels_are_independent() -> Result<()> {
    let batcher = MessageBatcher::new(BatcherConfig {
        max_batch_size: BatchSize::new(2).unwrap(),
        max_batch_delay: Duration::from_secs(60),
        ..BatcherConfig::default()
    });
    let prices = record(&batcher, "prices");
    let trades = record(&batcher, "trades");

    batcher.add_message("prices", 1u64, Priority::Normal).await?;
    batcher.add_message("trades", 10u64, Priority::Normal).await?;
    batcher.add_message("prices", 2u64, Priority::Normal).await?;

    assert_eq!(prices.lock().unwrap().len(), 1);
    assert!(trades.lock().unwrap().is_empty());
    assert_eq!(batcher.pending(&ChannelName::from("trades")), 1);

    assert_eq!(batcher.flush_all().await, 1);
    assert_eq!(trades.lock().unwrap()[0].1.messages(), &[10]);
    Ok(())
}

/// Repetitive payloads above the threshold are delivered compressed
#[tokio::test]
async fn test_compressible_batch_is_compressed() -> Result<()> {
    let batcher = MessageBatcher::new(BatcherConfig {
        max_batch_size: BatchSize::new(50).unwrap(),
        max_batch_delay: Duration::from_secs(60),
        compression_threshold: 256,
        ..BatcherConfig::default()
    });
    let delivered = record(&batcher, "holders");

    // Reaching the byte threshold flushes before the size limit
    for i in 0..50 {
        batcher
            .add_message(
                "holders",
                tick("SameMintAddressRepeated", f64::from(i % 2)),
                Priority::Normal,
            )
            .await?;
    }
    batcher.flush_all().await;

    let delivered = delivered.lock().unwrap();
    assert!(delivered.len() > 1);
    let total: usize = delivered.iter().map(|(_, batch)| batch.len()).sum();
    assert_eq!(total, 50);

    let batch = &delivered[0].1;
    assert!(batch.is_compressed());
    assert!((batch.compressed_size() as f64) <= 0.8 * batch.original_size() as f64);

    let json = inflate(batch.payload())?;
    assert_eq!(json.len(), batch.original_size());
    let decoded: Vec<PriceTick> = serde_json::from_slice(&json)?;
    assert_eq!(decoded.as_slice(), batch.messages());

    let stats = batcher.stats();
    assert!(stats.compressed_batches >= 1);
    assert!(stats.compression_ratio() < 0.8);
    Ok(())
}

/// Small batches are sent as plain JSON
#[tokio::test]
async fn test_small_batch_is_not_compressed() -> Result<()> {
    let batcher = MessageBatcher::new(BatcherConfig {
        max_batch_size: BatchSize::new(2).unwrap(),
        max_batch_delay: Duration::from_secs(60),
        compression_threshold: 1024,
        ..BatcherConfig::default()
    });
    let delivered = record(&batcher, "alerts");

    batcher.add_message("alerts", "rug".to_string(), Priority::High).await?;
    batcher.add_message("alerts", "pump".to_string(), Priority::High).await?;

    let delivered = delivered.lock().unwrap();
    let batch = &delivered[0].1;
    assert!(!batch.is_compressed());
    assert_eq!(batch.payload(), br#"["rug","pump"]"#);
    assert_eq!(batch.compressed_size(), batch.original_size());
    Ok(())
}

/// Slow processors shrink the effective batch size
#[tokio::test]
async fn test_slow_processor_shrinks_batch_size() -> Result<()> {
    let batcher = MessageBatcher::<u32>::new(BatcherConfig {
        max_batch_size: BatchSize::new(20).unwrap(),
        max_batch_delay: Duration::from_secs(60),
        ..BatcherConfig::default()
    });
    batcher.register_processor("slow", |_batch: BatchedMessage<u32>| async {
        tokio::time::sleep(Duration::from_millis(1100)).await;
        Ok(())
    });

    let channel = ChannelName::from("slow");
    assert_eq!(batcher.channel_batch_size(&channel), 20);
    batcher.add_message("slow", 1, Priority::Critical).await?;
    assert_eq!(batcher.channel_batch_size(&channel), 10);
    Ok(())
}
