//! Gnosis Mystic Server
//!
//! HTTP transport over the hijack and state engines: hijack control,
//! analysis metrics and the state timeline.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod builtins;
pub mod middleware;
pub mod options;
pub mod service;

pub use api::{router, ApiServer};
pub use middleware::CORRELATION_HEADER;
pub use service::{MysticService, ServiceError, ServiceResult};
