//! Configuration loading from files and environment variables
//!
//! This module handles loading configuration from TOML files and environment variables,
//! with environment variables taking precedence for Docker/container deployments.

use anyhow::Result;

use super::defaults;
use super::types::{Config, PoolConfig};
use crate::types::MaxPoolSize;

/// Load pool endpoints from environment variables
///
/// Supports indexed environment variables for Docker/container deployments:
/// - `SWARM_PERF_POOL_0_HOST`, `SWARM_PERF_POOL_0_PORT`, `SWARM_PERF_POOL_0_NAME`
/// - `SWARM_PERF_POOL_1_HOST`, ...
///
/// Optional per-pool variables:
/// - `SWARM_PERF_POOL_N_MIN_SIZE` - Idle connections kept warm (default: 2)
/// - `SWARM_PERF_POOL_N_MAX_SIZE` - Max connections (default: 10)
pub fn load_pools_from_env() -> Option<Vec<PoolConfig>> {
    let mut pools = Vec::new();
    let mut index = 0;

    loop {
        let Ok(host) = std::env::var(format!("SWARM_PERF_POOL_{index}_HOST")) else {
            break;
        };

        let port = std::env::var(format!("SWARM_PERF_POOL_{index}_PORT"))
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or_else(defaults::pool_port);

        let name = std::env::var(format!("SWARM_PERF_POOL_{index}_NAME"))
            .unwrap_or_else(|_| format!("pool-{index}"));

        let min_size = std::env::var(format!("SWARM_PERF_POOL_{index}_MIN_SIZE"))
            .ok()
            .and_then(|m| m.parse::<usize>().ok())
            .unwrap_or_else(defaults::min_size);

        let max_size = std::env::var(format!("SWARM_PERF_POOL_{index}_MAX_SIZE"))
            .ok()
            .and_then(|m| m.parse::<usize>().ok())
            .and_then(MaxPoolSize::new)
            .unwrap_or_else(defaults::max_size);

        pools.push(PoolConfig {
            min_size,
            max_size,
            ..PoolConfig::new(name, host, port)
        });

        index += 1;
    }

    if pools.is_empty() { None } else { Some(pools) }
}

/// Load configuration from a TOML file, with environment variable overrides
///
/// Environment variables for pool endpoints take precedence over the file
/// (see [`load_pools_from_env`]). The result is validated before it is
/// returned.
pub fn load_config(config_path: &str) -> Result<Config> {
    let config_content = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", config_path, e))?;

    let mut config: Config = toml::from_str(&config_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", config_path, e))?;

    if let Some(env_pools) = load_pools_from_env() {
        tracing::info!(
            "Using {} pool endpoint(s) from environment variables (overriding config file)",
            env_pools.len()
        );
        config.pools = env_pools;
    }

    config.validate()?;

    Ok(config)
}

/// Create a default configuration with a single local cache-store pool
#[must_use]
pub fn create_default_config() -> Config {
    Config {
        pools: vec![PoolConfig::new("cache", "127.0.0.1", defaults::pool_port())],
        ..Default::default()
    }
}

/// Load `config_path`, writing a default configuration there first if it does not exist
pub fn load_or_create_config(config_path: &str) -> Result<Config> {
    if std::path::Path::new(config_path).exists() {
        return load_config(config_path);
    }

    let config = create_default_config();
    let content = toml::to_string_pretty(&config)
        .map_err(|e| anyhow::anyhow!("Failed to serialize default config: {}", e))?;
    std::fs::write(config_path, content).map_err(|e| {
        anyhow::anyhow!("Failed to write default config to '{}': {}", config_path, e)
    })?;
    tracing::info!("Created default config file: {}", config_path);

    load_config(config_path)
}
