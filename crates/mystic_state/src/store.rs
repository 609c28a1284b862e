//! State store: a bounded snapshot timeline with a cursor
//!
//! Snapshots are kept oldest first in an insertion-ordered map keyed by id.
//! When the store is full the oldest snapshot is dropped; bookmark positions
//! shift with it so they keep pointing at the same snapshot, and bookmarks
//! whose snapshot was dropped are removed.

use crate::diff::{diff_maps, StateDiff};
use crate::payload;
use crate::snapshot::{Breakpoint, StateSnapshot, StateType};
use crate::timeline::{signed_position, TimelineError, TimelineExport, TimelineSummary};
use indexmap::IndexMap;
use mystic_core::time::now;
use mystic_core::{MysticConfig, SnapshotId, Timestamp, Value, WatcherId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Error returned by a watcher
pub type WatcherError = Box<dyn std::error::Error + Send + Sync>;

/// Callback for a tracked key: `(key, old value, new value)`
pub type Watcher = Arc<dyn Fn(&str, Option<&Value>, &Value) -> Result<(), WatcherError> + Send + Sync>;

/// Default timeline name
pub const DEFAULT_NAME: &str = "default";

/// State store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    /// Name recorded in exports
    pub name: String,
    /// Maximum retained snapshots
    pub max_snapshots: usize,
    /// Whether time travel is allowed
    pub enable_time_travel: bool,
    /// Whether diffing is allowed
    pub enable_diffing: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            max_snapshots: 1000,
            enable_time_travel: true,
            enable_diffing: true,
        }
    }
}

impl StateConfig {
    /// Create default config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take limits and switches from the process config
    #[must_use]
    pub fn from_config(config: &MysticConfig) -> Self {
        Self::new()
            .with_max_snapshots(config.max_snapshots)
            .with_time_travel(config.enable_time_travel)
            .with_diffing(config.enable_diffing)
    }

    /// Set name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set capacity (at least one)
    #[must_use]
    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = max.max(1);
        self
    }

    /// Enable or disable time travel
    #[must_use]
    pub fn with_time_travel(mut self, enabled: bool) -> Self {
        self.enable_time_travel = enabled;
        self
    }

    /// Enable or disable diffing
    #[must_use]
    pub fn with_diffing(mut self, enabled: bool) -> Self {
        self.enable_diffing = enabled;
        self
    }
}

/// Target of a time-travel request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimelinePosition {
    /// Absolute index into the timeline
    Index(i64),
    /// Bookmark name
    Bookmark(String),
}

impl From<i64> for TimelinePosition {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for TimelinePosition {
    fn from(name: &str) -> Self {
        Self::Bookmark(name.to_string())
    }
}

impl From<String> for TimelinePosition {
    fn from(name: String) -> Self {
        Self::Bookmark(name)
    }
}

/// Snapshot query. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotFilter {
    /// Only this state type
    pub state_type: Option<StateType>,
    /// Only snapshots from this function
    pub function_name: Option<String>,
    /// Not before (inclusive)
    pub start: Option<Timestamp>,
    /// Not after (inclusive)
    pub end: Option<Timestamp>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

impl SnapshotFilter {
    /// Match everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict state type
    #[must_use]
    pub fn with_state_type(mut self, state_type: StateType) -> Self {
        self.state_type = Some(state_type);
        self
    }

    /// Restrict function name
    #[must_use]
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Restrict time window
    #[must_use]
    pub fn with_window(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Keep the last `limit` matches
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, snapshot: &StateSnapshot) -> bool {
        self.state_type.is_none_or(|t| t == snapshot.state_type)
            && self
                .function_name
                .as_deref()
                .is_none_or(|f| snapshot.function_name.as_deref() == Some(f))
            && self.start.is_none_or(|s| snapshot.timestamp >= s)
            && self.end.is_none_or(|e| snapshot.timestamp <= e)
    }
}

/// Where a capture came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    /// Function name
    pub function_name: Option<String>,
    /// Line number
    pub line_number: Option<u32>,
    /// Extra metadata stored with the snapshot
    pub metadata: Map<String, Value>,
}

impl Provenance {
    /// Capture from `function` at `line`
    #[must_use]
    pub fn at(function: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            function_name: Some(function.into()),
            line_number: line,
            metadata: Map::new(),
        }
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

struct Timeline {
    snapshots: IndexMap<SnapshotId, StateSnapshot>,
    current: Map<String, Value>,
    cursor: Option<usize>,
    bookmarks: BTreeMap<String, usize>,
    breakpoints: BTreeSet<Breakpoint>,
    last_id: SnapshotId,
}

impl Timeline {
    fn new() -> Self {
        Self {
            snapshots: IndexMap::new(),
            current: Map::new(),
            cursor: None,
            bookmarks: BTreeMap::new(),
            breakpoints: BTreeSet::new(),
            last_id: SnapshotId::from_raw(0),
        }
    }

    fn push(
        &mut self,
        capacity: usize,
        state_type: StateType,
        data: Map<String, Value>,
        provenance: Provenance,
    ) -> SnapshotId {
        self.last_id = self.last_id.next();
        let id = self.last_id;

        let Provenance {
            function_name,
            line_number,
            mut metadata,
        } = provenance;
        if self
            .breakpoints
            .iter()
            .any(|bp| bp.matches(function_name.as_deref(), line_number))
        {
            tracing::debug!(snapshot = %id, "breakpoint hit");
            metadata.insert("breakpoint_hit".to_string(), Value::Bool(true));
        }

        let capacity = capacity.max(1);
        if self.snapshots.len() >= capacity {
            self.drop_oldest(self.snapshots.len() + 1 - capacity);
        }
        self.snapshots.insert(
            id,
            StateSnapshot {
                id,
                timestamp: now(),
                function_name,
                line_number,
                state_type,
                data,
                metadata,
            },
        );
        self.cursor = Some(self.snapshots.len() - 1);
        id
    }

    fn drop_oldest(&mut self, count: usize) {
        let count = count.min(self.snapshots.len());
        self.snapshots.drain(..count);
        self.bookmarks = std::mem::take(&mut self.bookmarks)
            .into_iter()
            .filter_map(|(name, pos)| pos.checked_sub(count).map(|p| (name, p)))
            .collect();
        // a cursor on a dropped snapshot moves to the oldest survivor
        self.cursor = self
            .cursor
            .map(|c| c.saturating_sub(count))
            .filter(|_| !self.snapshots.is_empty());
    }

    fn resolve(&self, position: &TimelinePosition) -> Option<usize> {
        let index = match position {
            TimelinePosition::Index(i) => usize::try_from(*i).ok()?,
            TimelinePosition::Bookmark(name) => *self.bookmarks.get(name)?,
        };
        (index < self.snapshots.len()).then_some(index)
    }
}

/// Bounded, thread-safe snapshot timeline
pub struct StateStore {
    config: StateConfig,
    timeline: Mutex<Timeline>,
    watchers: RwLock<IndexMap<String, Vec<(WatcherId, Watcher)>>>,
    next_watcher: AtomicU64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StateConfig::default())
    }
}

impl StateStore {
    /// Create an empty store
    #[must_use]
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            timeline: Mutex::new(Timeline::new()),
            watchers: RwLock::new(IndexMap::new()),
            next_watcher: AtomicU64::new(1),
        }
    }

    /// Create a store sized from the process config
    #[must_use]
    pub fn from_config(config: &MysticConfig) -> Self {
        Self::new(StateConfig::from_config(config))
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Record a snapshot with no provenance
    pub fn capture(&self, state_type: StateType, data: Map<String, Value>) -> SnapshotId {
        self.capture_with(state_type, data, Provenance::default())
    }

    /// Record a snapshot and move the cursor to it
    pub fn capture_with(
        &self,
        state_type: StateType,
        data: Map<String, Value>,
        provenance: Provenance,
    ) -> SnapshotId {
        let id = self
            .timeline
            .lock()
            .push(self.config.max_snapshots, state_type, data, provenance);
        tracing::trace!(snapshot = %id, %state_type, "captured");
        id
    }

    /// Record `value` under `name` as a `{__class__, __dict__}` object record
    pub fn capture_object<T: Serialize + Debug>(
        &self,
        state_type: StateType,
        name: &str,
        value: &T,
        provenance: Provenance,
    ) -> SnapshotId {
        let data = payload::single(name, payload::object_record(value));
        self.capture_with(state_type, data, provenance)
    }

    /// Set `key` in the current state. When the value changed, a snapshot
    /// tagged with `changed_key` is recorded and the key's watchers run.
    pub fn update_state(&self, key: &str, value: Value, state_type: StateType) -> Option<SnapshotId> {
        let (old, id) = {
            let mut timeline = self.timeline.lock();
            let old = timeline.current.insert(key.to_string(), value.clone());
            if old.as_ref() == Some(&value) {
                return None;
            }
            let provenance = Provenance::default().with_metadata("changed_key", key);
            let id = timeline.push(
                self.config.max_snapshots,
                state_type,
                payload::single(key, value.clone()),
                provenance,
            );
            (old, id)
        };

        let watchers: Vec<Watcher> = self
            .watchers
            .read()
            .get(key)
            .map(|list| list.iter().map(|(_, w)| w.clone()).collect())
            .unwrap_or_default();
        for watcher in watchers {
            if let Err(err) = watcher(key, old.as_ref(), &value) {
                tracing::warn!(key, %err, "state watcher failed");
            }
        }
        Some(id)
    }

    /// Serialize `value` and store it under `name`
    pub fn track<T: Serialize + Debug>(&self, name: &str, value: &T) -> Option<SnapshotId> {
        self.update_state(name, payload::to_payload(value), StateType::Variable)
    }

    /// Copy of the current-state projection
    #[must_use]
    pub fn current_state(&self) -> Map<String, Value> {
        self.timeline.lock().current.clone()
    }

    /// Cursor, `None` when the timeline is empty
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        self.timeline.lock().cursor
    }

    /// Number of retained snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.timeline.lock().snapshots.len()
    }

    /// Whether no snapshots are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a snapshot by id
    #[must_use]
    pub fn get_snapshot(&self, id: SnapshotId) -> Option<StateSnapshot> {
        self.timeline.lock().snapshots.get(&id).cloned()
    }

    /// Snapshots matching `filter`, oldest first
    #[must_use]
    pub fn get_snapshots(&self, filter: &SnapshotFilter) -> Vec<StateSnapshot> {
        let timeline = self.timeline.lock();
        let mut found: Vec<StateSnapshot> = timeline
            .snapshots
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let skip = found.len().saturating_sub(limit);
            found.drain(..skip);
        }
        found
    }

    /// Structural diff between two snapshots. Empty when diffing is
    /// disabled or either id is unknown.
    #[must_use]
    pub fn diff(&self, left: SnapshotId, right: SnapshotId) -> Vec<StateDiff> {
        if !self.config.enable_diffing {
            return Vec::new();
        }
        let timeline = self.timeline.lock();
        match (timeline.snapshots.get(&left), timeline.snapshots.get(&right)) {
            (Some(a), Some(b)) => diff_maps(&a.data, &b.data),
            _ => {
                tracing::debug!(%left, %right, "diff of unknown snapshot");
                Vec::new()
            }
        }
    }

    /// Move the cursor and restore the current state from that snapshot.
    /// Returns false, leaving everything unchanged, when time travel is
    /// disabled or the position does not resolve.
    pub fn travel_to(&self, position: impl Into<TimelinePosition>) -> bool {
        if !self.config.enable_time_travel {
            return false;
        }
        let position = position.into();
        let mut timeline = self.timeline.lock();
        let Some(index) = timeline.resolve(&position) else {
            tracing::debug!(?position, "time travel target out of range");
            return false;
        };
        let Some(data) = timeline.snapshots.get_index(index).map(|(_, s)| s.data.clone()) else {
            return false;
        };
        timeline.current = data;
        timeline.cursor = Some(index);
        tracing::debug!(position = index, "time travel");
        true
    }

    /// Move forward `steps` snapshots
    pub fn travel_forward(&self, steps: i64) -> bool {
        let target = signed_position(self.position()).saturating_add(steps);
        self.travel_to(target)
    }

    /// Move backward `steps` snapshots
    pub fn travel_backward(&self, steps: i64) -> bool {
        let target = signed_position(self.position()).saturating_sub(steps);
        self.travel_to(target)
    }

    /// Name a position, the cursor by default. Out-of-range positions are
    /// ignored and return false.
    pub fn create_bookmark(&self, name: &str, position: Option<usize>) -> bool {
        let mut timeline = self.timeline.lock();
        let Some(pos) = position.or(timeline.cursor) else {
            return false;
        };
        if pos >= timeline.snapshots.len() {
            return false;
        }
        timeline.bookmarks.insert(name.to_string(), pos);
        true
    }

    /// Bookmarks by name
    #[must_use]
    pub fn bookmarks(&self) -> BTreeMap<String, usize> {
        self.timeline.lock().bookmarks.clone()
    }

    /// Register a callback for changes to `key`
    pub fn add_watcher<F>(&self, key: &str, watcher: F) -> WatcherId
    where
        F: Fn(&str, Option<&Value>, &Value) -> Result<(), WatcherError> + Send + Sync + 'static,
    {
        let id = WatcherId::from_raw(self.next_watcher.fetch_add(1, Ordering::Relaxed));
        self.watchers
            .write()
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(watcher)));
        id
    }

    /// Remove a watcher. Returns false if it was not registered.
    pub fn remove_watcher(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.write();
        let mut removed = false;
        for list in watchers.values_mut() {
            let before = list.len();
            list.retain(|(wid, _)| *wid != id);
            removed |= list.len() != before;
        }
        watchers.retain(|_, list| !list.is_empty());
        removed
    }

    /// Flag captures from this location
    pub fn add_breakpoint(&self, function_name: Option<&str>, line_number: Option<u32>) {
        self.timeline
            .lock()
            .breakpoints
            .insert(Breakpoint::new(function_name, line_number));
    }

    /// Remove a breakpoint. Returns false if it was not set.
    pub fn remove_breakpoint(&self, function_name: Option<&str>, line_number: Option<u32>) -> bool {
        self.timeline
            .lock()
            .breakpoints
            .remove(&Breakpoint::new(function_name, line_number))
    }

    /// Aggregate view of the timeline
    #[must_use]
    pub fn timeline_summary(&self) -> TimelineSummary {
        let timeline = self.timeline.lock();
        let mut snapshot_types: BTreeMap<StateType, usize> =
            StateType::ALL.into_iter().map(|t| (t, 0)).collect();
        let mut memory_usage = 0;
        for snapshot in timeline.snapshots.values() {
            *snapshot_types.entry(snapshot.state_type).or_default() += 1;
            memory_usage += snapshot.payload_size();
        }
        TimelineSummary {
            total_snapshots: timeline.snapshots.len(),
            current_position: signed_position(timeline.cursor),
            bookmarks: timeline.bookmarks.keys().cloned().collect(),
            breakpoints: timeline.breakpoints.iter().map(ToString::to_string).collect(),
            snapshot_types,
            memory_usage,
        }
    }

    /// Drop all snapshots, bookmarks and current state. Watchers and
    /// breakpoints stay registered.
    pub fn clear(&self) {
        let mut timeline = self.timeline.lock();
        let breakpoints = std::mem::take(&mut timeline.breakpoints);
        *timeline = Timeline::new();
        timeline.breakpoints = breakpoints;
        tracing::info!(name = %self.config.name, "timeline cleared");
    }

    /// Snapshot of the whole timeline in export form
    #[must_use]
    pub fn to_export(&self) -> TimelineExport {
        let timeline = self.timeline.lock();
        TimelineExport {
            name: self.config.name.clone(),
            created: now(),
            snapshots: timeline.snapshots.values().cloned().collect(),
            bookmarks: timeline.bookmarks.clone(),
            current_position: signed_position(timeline.cursor),
        }
    }

    /// Replace the whole timeline. Snapshots beyond capacity are dropped
    /// oldest first; the current state is restored from the cursor.
    ///
    /// # Errors
    ///
    /// Returns error if the cursor does not point into the snapshots or two
    /// snapshots share an id
    pub fn restore(&self, export: TimelineExport) -> Result<(), TimelineError> {
        let len = export.snapshots.len();
        let cursor = match export.current_position {
            -1 if len == 0 => None,
            p => match usize::try_from(p) {
                Ok(c) if c < len => Some(c),
                _ => {
                    return Err(TimelineError::InvalidPosition {
                        position: export.current_position,
                        len,
                    });
                }
            },
        };

        let mut fresh = Timeline::new();
        fresh.last_id = export
            .snapshots
            .iter()
            .map(|s| s.id)
            .max()
            .unwrap_or(fresh.last_id);
        for snapshot in export.snapshots {
            let id = snapshot.id;
            if fresh.snapshots.insert(id, snapshot).is_some() {
                return Err(TimelineError::DuplicateSnapshot(id));
            }
        }
        fresh.bookmarks = export
            .bookmarks
            .into_iter()
            .filter(|(_, pos)| *pos < len)
            .collect();
        fresh.cursor = cursor;
        let excess = fresh.snapshots.len().saturating_sub(self.config.max_snapshots);
        if excess > 0 {
            tracing::warn!(excess, "imported timeline exceeds capacity");
            fresh.drop_oldest(excess);
        }
        if let Some((_, snapshot)) = fresh.cursor.and_then(|c| fresh.snapshots.get_index(c)) {
            fresh.current = snapshot.data.clone();
        }

        let mut timeline = self.timeline.lock();
        fresh.breakpoints = std::mem::take(&mut timeline.breakpoints);
        *timeline = fresh;
        Ok(())
    }

    /// Serialize the timeline as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn export_json(&self) -> Result<String, TimelineError> {
        Ok(serde_json::to_string_pretty(&self.to_export())?)
    }

    /// Replace the timeline from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid timeline
    pub fn import_json(&self, text: &str) -> Result<(), TimelineError> {
        self.restore(serde_json::from_str(text)?)
    }

    /// Write the timeline to `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn export_to(&self, path: &Path) -> Result<(), TimelineError> {
        let text = self.export_json()?;
        std::fs::write(path, text).map_err(|source| TimelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "timeline exported");
        Ok(())
    }

    /// Replace the timeline from the file at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid timeline
    pub fn import_from(&self, path: &Path) -> Result<(), TimelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| TimelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.import_json(&text)?;
        tracing::info!(path = %path.display(), "timeline imported");
        Ok(())
    }
}
