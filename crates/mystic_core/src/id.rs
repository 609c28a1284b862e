//! Identifiers for Mystic entities.
//!
//! Snapshot and watcher IDs are sequential within their owning store.
//! Correlation IDs are UUIDs so they stay unique across processes.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Snapshot identifier - assigned monotonically by a state store
///
/// Rendered as `snapshot_<n>` in text and in serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(u64);

impl SnapshotId {
    /// Text prefix used by the display form
    pub const PREFIX: &'static str = "snapshot_";

    /// Create from the raw sequence number
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw sequence number
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Next identifier in sequence
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidId {
                reason: format!("not a snapshot id: {}", s),
            })
    }
}

impl Serialize for SnapshotId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SnapshotId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Watcher identifier - returned when registering a state watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watcher_{}", self.0)
    }
}

/// Correlation identifier - links a transport request to its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Create a new random CorrelationId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|e| CoreError::InvalidId {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_id_display() {
        let id = SnapshotId::from_raw(7);
        assert_eq!(id.to_string(), "snapshot_7");
        assert_eq!(id.next().as_u64(), 8);
    }

    #[test]
    fn test_snapshot_id_parse() {
        assert_eq!("snapshot_12".parse::<SnapshotId>().unwrap(), SnapshotId::from_raw(12));
        assert_eq!("12".parse::<SnapshotId>().unwrap(), SnapshotId::from_raw(12));
        assert!("snap_x".parse::<SnapshotId>().is_err());
    }

    #[test]
    fn test_snapshot_id_serde() {
        let id = SnapshotId::from_raw(3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"snapshot_3\"");
        let back: SnapshotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_snapshot_id_ordering() {
        assert!(SnapshotId::from_raw(1) < SnapshotId::from_raw(2));
    }

    #[test]
    fn test_correlation_id_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_correlation_id_parse() {
        let id = CorrelationId::new();
        let parsed: CorrelationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<CorrelationId>().is_err());
    }

    #[test]
    fn test_watcher_id_display() {
        assert_eq!(WatcherId::from_raw(4).to_string(), "watcher_4");
    }
}
