use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use swarm_perf::logging::{init_logging, init_stdout_logging};
use swarm_perf::runtime::{RuntimeConfig, shutdown_signal};
use swarm_perf::{PerformanceLayer, TracingSink, load_or_create_config};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (written with defaults if missing)
    ///
    /// Can be overridden with SWARM_PERF_CONFIG environment variable
    #[arg(short, long, default_value = "swarm-perf.toml", env = "SWARM_PERF_CONFIG")]
    config: String,

    /// Number of worker threads (defaults to number of CPU cores)
    ///
    /// Can be overridden with SWARM_PERF_THREADS environment variable
    #[arg(short, long, env = "SWARM_PERF_THREADS")]
    threads: Option<usize>,

    /// Directory for swarm-perf.log; stdout only when omitted
    #[arg(long, env = "SWARM_PERF_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match &args.log_dir {
        Some(dir) => init_logging(dir)?,
        None => init_stdout_logging(),
    }

    let rt = RuntimeConfig::from_threads(args.threads).build_runtime()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let config = match load_or_create_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config file '{}': {}", args.config, e);
            return Err(e);
        }
    };

    info!("Loaded {} connection pools:", config.pools.len());
    for pool in &config.pools {
        info!(
            "  - {} ({}) min={} max={}",
            pool.name,
            pool.address(),
            pool.min_size,
            pool.max_size
        );
    }

    let layer = Arc::new(PerformanceLayer::new(config, Arc::new(TracingSink))?);
    let pools = Arc::new(layer.tcp_pool_manager().await?);
    layer.register_metrics_source(pools.clone());
    layer.start();

    info!("Performance layer running, press Ctrl+C to stop");
    shutdown_signal().await;
    info!("Shutdown signal received");

    pools.shutdown().await;
    layer.shutdown().await;
    info!("Graceful shutdown complete");
    Ok(())
}
