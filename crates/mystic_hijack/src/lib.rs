//! Gnosis Mystic Hijacking Engine
//!
//! Intercepts calls to named functions and resolves, per call, which
//! strategy (if any) handles them: cache, mock, block, redirect, analysis or
//! a conditional composite. Routers are held in an explicit registry handle
//! rather than global state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod notify;
pub mod registry;
pub mod router;
pub mod store;
pub mod strategy;

pub use catalog::{CatalogError, FunctionCatalog};
pub use notify::{CallNotification, NotificationHub, Subscriber, SubscriberError};
pub use registry::RouterRegistry;
pub use router::{analyze, block, cache, hijack_function, mock, redirect};
pub use router::{CallRouter, RouterMetrics, SharedStrategy};
pub use store::{cache_key, CacheConfig, CacheError, CacheStats, CacheStore};
pub use strategy::{
    AnalysisStrategy, BlockStrategy, CacheStrategy, CallContext, CallSample, ConditionalStrategy,
    FunctionSummary, HijackResult, MockData, MockStrategy, Priority, RedirectStrategy, Strategy,
    StrategyKind,
};
