//! Pool health tracking
//!
//! Each connection pool owns a [`PoolHealth`] record updated by its
//! background probe loop. Unhealthy pools are excluded from selection and
//! healthy ones carry a utilization-derived weight.

mod types;

pub use types::{HealthMetrics, HealthStatus, HealthTransition, PoolHealth, weight_for_utilization};
