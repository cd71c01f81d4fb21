//! Connection pooling
//!
//! Named pools of reusable connections built on deadpool. Each pool is
//! generic over a [`Connector`], pre-warmed to `min_size`, health-checked and
//! trimmed in the background, and never makes a caller wait: when every
//! connection is borrowed, acquisition fails fast with
//! [`PoolError::PoolExhausted`].

mod connector;
mod deadpool_connection;
mod error;
pub mod health_check;
mod manager;
mod provider;
mod selection;

pub use connector::{Connector, TcpConnector};
pub use deadpool_connection::{ConnectorManager, PoolCounters, PoolHandle, PooledConnection};
pub use error::PoolError;
pub use health_check::{HealthCheckError, Probe};
pub use manager::ConnectionPoolManager;
pub use provider::{Builder, CleanupReport, NamedPool, PoolSettings, PoolStats};
pub use selection::{PoolLoad, select_least_loaded};
