//! Logging setup with dual output (stdout + log file)

use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log file written next to the configuration by default
pub const DEFAULT_LOG_FILE: &str = "swarm-perf.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging to stdout and `dir/swarm-perf.log`
///
/// Both outputs use the level from `RUST_LOG`, defaulting to `info`. The
/// file writer is non-blocking; its guard is leaked so buffered lines are
/// kept for the program lifetime.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(dir: &Path) -> anyhow::Result<()> {
    let file_appender = tracing_appender::rolling::never(dir, DEFAULT_LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logging subscriber: {}", e))?;

    std::mem::forget(guard);
    Ok(())
}

/// Initialize stdout-only logging (embedding applications, tests)
///
/// Silently does nothing if a subscriber is already installed.
pub fn init_stdout_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .compact()
                .with_filter(env_filter()),
        )
        .try_init();
}
