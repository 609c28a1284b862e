//! Gnosis Mystic State Timeline
//!
//! Records program state as a bounded sequence of snapshots and supports:
//! - Time travel by index or bookmark, restoring a current-state projection
//! - Structural diffs between any two snapshots
//! - Per-key watchers and source-location breakpoints
//! - Export and import of the whole timeline as JSON

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod payload;
pub mod snapshot;
pub mod store;
pub mod timeline;

pub use diff::{apply_inverse, diff_maps, DiffOp, StateDiff};
pub use snapshot::{Breakpoint, StateSnapshot, StateType};
pub use store::{
    Provenance, SnapshotFilter, StateConfig, StateStore, TimelinePosition, Watcher, WatcherError,
};
pub use timeline::{TimelineError, TimelineExport, TimelineSummary};
