//! Name newtypes for pools and batch channels

use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};

/// The name of a connection pool or object pool.
///
/// # Examples
///
/// ```
/// use swarm_perf::types::PoolName;
///
/// let name = PoolName::from("redis-primary");
/// assert_eq!(name.as_str(), "redis-primary");
/// assert_eq!(name.to_string(), "redis-primary");
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    From,
    Into,
    AsRef,
    Deref,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PoolName(String);

impl PoolName {
    /// Borrow the name as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PoolName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The name of a logical batch channel (e.g. a WebSocket topic).
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    From,
    Into,
    AsRef,
    Deref,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Borrow the name as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for PoolName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_pool_name_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(PoolName::from("db"), 1);
        assert_eq!(map.get("db"), Some(&1));
    }

    #[test]
    fn test_channel_name_deref() {
        let channel = ChannelName::from(String::from("alerts"));
        assert_eq!(channel.len(), 6);
        assert!(channel.starts_with("al"));
    }

    #[test]
    fn test_names_serialize_transparently() {
        let json = serde_json::to_string(&PoolName::from("cache")).unwrap();
        assert_eq!(json, "\"cache\"");
        let back: ChannelName = serde_json::from_str("\"feed\"").unwrap();
        assert_eq!(back.as_str(), "feed");
    }
}
