//! Configuration module
//!
//! This module handles all configuration types and loading
//! for the performance layer.

mod defaults;
mod loading;
mod types;
mod validation;

pub use loading::{create_default_config, load_config, load_or_create_config, load_pools_from_env};
pub use types::{
    BatcherConfig, CleanupConfig, ConcurrencyConfig, Config, HealthCheckConfig, MemoryConfig,
    MetricsConfig, PoolConfig, ProbeConfig,
};
