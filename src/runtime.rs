//! Tokio runtime configuration and shutdown signal handling for the binary

use anyhow::Result;
use tracing::{info, warn};

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    worker_threads: usize,
}

impl RuntimeConfig {
    /// Runtime config from an optional thread count
    ///
    /// `None` or `Some(0)` uses the number of CPU cores. A single thread
    /// selects the current-thread runtime.
    #[must_use]
    pub fn from_threads(threads: Option<usize>) -> Self {
        let worker_threads = match threads {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
        };
        Self { worker_threads }
    }

    #[must_use]
    pub const fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    #[must_use]
    pub const fn is_single_threaded(&self) -> bool {
        self.worker_threads == 1
    }

    /// Build the tokio runtime
    ///
    /// # Errors
    /// Returns error if runtime creation fails
    pub fn build_runtime(&self) -> Result<tokio::runtime::Runtime> {
        let rt = if self.is_single_threaded() {
            info!("Starting swarm-perf with single-threaded runtime");
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
        } else {
            info!(
                "Starting swarm-perf with {} worker threads",
                self.worker_threads
            );
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(self.worker_threads)
                .enable_all()
                .build()?
        };
        Ok(rt)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_threads(None)
    }
}

/// Wait for Ctrl+C (or SIGTERM on Unix)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_thread_count() {
        let config = RuntimeConfig::from_threads(Some(4));
        assert_eq!(config.worker_threads(), 4);
        assert!(!config.is_single_threaded());
    }

    #[test]
    fn test_single_thread() {
        let config = RuntimeConfig::from_threads(Some(1));
        assert!(config.is_single_threaded());
        let rt = config.build_runtime().unwrap();
        assert_eq!(rt.block_on(async { 1 + 1 }), 2);
    }

    #[test]
    fn test_zero_uses_cpu_count() {
        let config = RuntimeConfig::from_threads(Some(0));
        assert!(config.worker_threads() >= 1);
        assert_eq!(config, RuntimeConfig::default());
    }
}
