//! Connection pool metric newtypes
//!
//! This module provides type-safe wrappers for connection pool counters
//! to prevent accidentally mixing different pool statistics.

use std::fmt;

/// Number of available connections in the pool
///
/// Represents connections that are idle and ready to be used.
/// This value should always be ≤ the pool's maximum size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AvailableConnections(usize);

impl AvailableConnections {
    /// Create a new available connections count
    #[inline]
    pub const fn new(count: usize) -> Self {
        Self(count)
    }

    /// Get the raw value
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for AvailableConnections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of connections currently checked out by borrowers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InUseConnections(usize);

impl InUseConnections {
    /// Create a new in-use connections count
    #[inline]
    pub const fn new(count: usize) -> Self {
        Self(count)
    }

    /// Get the raw value
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Fraction of `max_size` currently in use (0.0 to 1.0)
    #[must_use]
    pub fn utilization(self, max_size: usize) -> f64 {
        if max_size == 0 {
            0.0
        } else {
            (self.0 as f64 / max_size as f64).min(1.0)
        }
    }
}

impl fmt::Display for InUseConnections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Total number of connections created in the pool's lifetime
///
/// This is a monotonically increasing counter that tracks all connections
/// created since the pool was initialized. Useful for monitoring connection
/// churn and pool efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CreatedConnections(u64);

impl CreatedConnections {
    /// Create a new created connections count
    #[inline]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    /// Get the raw value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CreatedConnections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_connections() {
        let available = AvailableConnections::new(5);
        assert_eq!(available.get(), 5);
        assert_eq!(available.to_string(), "5");
        assert_eq!(AvailableConnections::default().get(), 0);
    }

    #[test]
    fn test_in_use_utilization() {
        assert_eq!(InUseConnections::new(0).utilization(10), 0.0);
        assert_eq!(InUseConnections::new(5).utilization(10), 0.5);
        assert_eq!(InUseConnections::new(10).utilization(10), 1.0);
        assert_eq!(InUseConnections::new(3).utilization(0), 0.0);
    }

    #[test]
    fn test_created_connections_ordering() {
        assert!(CreatedConnections::new(1) < CreatedConnections::new(2));
        assert_eq!(CreatedConnections::new(7).to_string(), "7");
    }
}
