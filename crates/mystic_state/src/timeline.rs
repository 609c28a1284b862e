//! Timeline export format and summary

use crate::snapshot::{StateSnapshot, StateType};
use mystic_core::{SnapshotId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Timeline persistence error
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// File could not be read or written
    #[error("timeline file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Text is not a valid timeline
    #[error("invalid timeline: {0}")]
    Format(#[from] serde_json::Error),
    /// Cursor does not point into the snapshot list
    #[error("cursor {position} out of range for {len} snapshots")]
    InvalidPosition {
        /// Stored cursor
        position: i64,
        /// Number of snapshots
        len: usize,
    },
    /// Two snapshots share an id
    #[error("duplicate snapshot {0}")]
    DuplicateSnapshot(SnapshotId),
}

/// Serialized form of a whole timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineExport {
    /// Store name
    pub name: String,
    /// Export time
    pub created: Timestamp,
    /// Snapshots, oldest first
    pub snapshots: Vec<StateSnapshot>,
    /// Bookmark name to position
    #[serde(default)]
    pub bookmarks: BTreeMap<String, usize>,
    /// Cursor, `-1` when empty
    pub current_position: i64,
}

/// Aggregate view of a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    /// Number of retained snapshots
    pub total_snapshots: usize,
    /// Cursor, `-1` when empty
    pub current_position: i64,
    /// Bookmark names
    pub bookmarks: Vec<String>,
    /// Breakpoints as `func:line`, `*` for wildcards
    pub breakpoints: Vec<String>,
    /// Snapshot count per state type, every type listed
    pub snapshot_types: BTreeMap<StateType, usize>,
    /// Sum of payload text lengths
    pub memory_usage: usize,
}

/// Cursor as the signed form used on the wire
#[must_use]
pub(crate) fn signed_position(cursor: Option<usize>) -> i64 {
    cursor.map_or(-1, |c| i64::try_from(c).unwrap_or(i64::MAX))
}
