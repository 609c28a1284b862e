//! Gnosis Mystic Core Types
//!
//! Shared vocabulary for the hijacking and state engines: call arguments,
//! function identity, environments, identifiers, time and configuration.
//! Nothing in this crate holds global state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod config;
pub mod environment;
pub mod error;
pub mod function;
pub mod hash;
pub mod id;
pub mod time;

// Re-exports
pub use call::{CallArgs, CallError, Value};
pub use config::{ConfigError, MysticConfig};
pub use environment::Environment;
pub use error::{CoreError, CoreResult};
pub use function::{Callable, Function, FunctionId};
pub use hash::Digest;
pub use id::{CorrelationId, SnapshotId, WatcherId};
pub use time::{DurationSpec, Timestamp, DEFAULT_TTL};
