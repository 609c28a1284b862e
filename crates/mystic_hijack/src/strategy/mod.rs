//! Strategy interface and the call-scoped types it works with.
//!
//! A strategy answers two questions on every call: should it intervene,
//! and what happens instead of (or around) the real function. Strategies
//! are evaluated in ascending [`Priority`] and the first one that wants to
//! intervene wins.

use mystic_core::{CallArgs, CallError, Environment, Function, FunctionId, Timestamp, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

pub mod analysis;
pub mod block;
pub mod cache;
pub mod conditional;
pub mod mock;
pub mod redirect;

pub use analysis::{AnalysisCallback, AnalysisStrategy, CallSample, FunctionSummary};
pub use block::BlockStrategy;
pub use cache::CacheStrategy;
pub use conditional::{ConditionalStrategy, Predicate};
pub use mock::{MockData, MockGenerator, MockStrategy};
pub use redirect::{ArgsTransform, RedirectStrategy, ResultTransform};

/// Strategy precedence. Lower value is evaluated first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Evaluated first
    Highest = 1,
    /// Before normal strategies
    High = 2,
    /// Default band
    #[default]
    Normal = 3,
    /// After normal strategies
    Low = 4,
    /// Evaluated last
    Lowest = 5,
}

impl Priority {
    /// Numeric rank (1..=5)
    #[must_use]
    pub const fn value(&self) -> u8 {
        *self as u8
    }

    /// Uppercase band name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "HIGHEST",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::Lowest => "LOWEST",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HIGHEST" | "1" => Ok(Self::Highest),
            "HIGH" | "2" => Ok(Self::High),
            "NORMAL" | "3" => Ok(Self::Normal),
            "LOW" | "4" => Ok(Self::Low),
            "LOWEST" | "5" => Ok(Self::Lowest),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Kind of a strategy, used to remove strategies by type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Result caching
    Cache,
    /// Mocked results
    Mock,
    /// Blocked calls
    Block,
    /// Redirected calls
    Redirect,
    /// Observed calls
    Analysis,
    /// Predicate-selected delegation
    Conditional,
}

impl StrategyKind {
    /// Lowercase kind name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Mock => "mock",
            Self::Block => "block",
            Self::Redirect => "redirect",
            Self::Analysis => "analysis",
            Self::Conditional => "conditional",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cache" => Ok(Self::Cache),
            "mock" => Ok(Self::Mock),
            "block" => Ok(Self::Block),
            "redirect" => Ok(Self::Redirect),
            "analyze" | "analysis" => Ok(Self::Analysis),
            "conditional" => Ok(Self::Conditional),
            other => Err(format!("unknown strategy kind: {}", other)),
        }
    }
}

/// Per-invocation context handed to strategies
///
/// Built fresh by the router for every call and dropped when dispatch
/// returns.
#[derive(Debug, Clone)]
pub struct CallContext<'a> {
    /// Identity of the target function
    pub function: &'a FunctionId,
    /// Arguments exactly as passed
    pub args: &'a CallArgs,
    /// Environment of the owning router
    pub environment: Environment,
    /// Router call counter value for this call
    pub call_count: u64,
    /// When the call started
    pub timestamp: Timestamp,
    /// Free-form metadata
    pub metadata: Map<String, Value>,
}

impl<'a> CallContext<'a> {
    /// Create a context stamped with the current time
    #[must_use]
    pub fn new(
        function: &'a FunctionId,
        args: &'a CallArgs,
        environment: Environment,
        call_count: u64,
    ) -> Self {
        Self {
            function,
            args,
            environment,
            call_count,
            timestamp: mystic_core::time::now(),
            metadata: Map::new(),
        }
    }

    /// Qualified name of the target function
    #[must_use]
    pub fn qualname(&self) -> String {
        self.function.qualname()
    }
}

/// Uniform outcome of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct HijackResult {
    /// Whether a value was produced
    pub executed: bool,
    /// Name of the strategy that handled the call, `None` on pass-through
    pub strategy: Option<String>,
    /// Produced value (`Null` when none)
    pub value: Value,
    /// Error to surface to the caller
    pub error: Option<CallError>,
    /// Wall time spent
    pub elapsed: Duration,
    /// Strategy metadata
    pub metadata: Map<String, Value>,
}

impl HijackResult {
    /// A produced value
    #[must_use]
    pub fn value(strategy: Option<&str>, value: Value) -> Self {
        Self {
            executed: true,
            strategy: strategy.map(str::to_string),
            value,
            error: None,
            elapsed: Duration::ZERO,
            metadata: Map::new(),
        }
    }

    /// A failed call
    #[must_use]
    pub fn failed(strategy: Option<&str>, error: CallError) -> Self {
        Self {
            executed: false,
            strategy: strategy.map(str::to_string),
            value: Value::Null,
            error: Some(error),
            elapsed: Duration::ZERO,
            metadata: Map::new(),
        }
    }

    /// Build from a call outcome
    #[must_use]
    pub fn from_outcome(strategy: Option<&str>, outcome: Result<Value, CallError>) -> Self {
        match outcome {
            Ok(value) => Self::value(strategy, value),
            Err(error) => Self::failed(strategy, error),
        }
    }

    /// Set elapsed time
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Replace the metadata map
    #[must_use]
    pub fn with_metadata_map(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the result carries an error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into what the caller of the hijacked function observes
    ///
    /// # Errors
    ///
    /// Returns the carried error verbatim
    pub fn into_outcome(self) -> Result<Value, CallError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }
}

/// A pluggable interception policy
pub trait Strategy: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Strategy kind
    fn kind(&self) -> StrategyKind;

    /// Evaluation rank
    fn priority(&self) -> Priority;

    /// Decide whether to handle this call. Must not change call semantics.
    fn should_intervene(&self, _ctx: &CallContext<'_>) -> bool {
        true
    }

    /// Handle the call in place of the router
    fn intervene(&self, ctx: &CallContext<'_>, original: &Function) -> HijackResult;

    /// Downcast hook used to collect analysis samples
    fn as_analysis(&self) -> Option<&AnalysisStrategy> {
        None
    }

    /// `Name(priority=LEVEL)`
    fn describe(&self) -> String {
        format!("{}(priority={})", self.name(), self.priority())
    }
}

/// Run `f` and measure its wall time
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_order() {
        assert!(Priority::Highest < Priority::High);
        assert!(Priority::Low < Priority::Lowest);
        assert_eq!(Priority::Normal.value(), 3);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("highest".parse::<Priority>().unwrap(), Priority::Highest);
        assert_eq!("4".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("analyze".parse::<StrategyKind>().unwrap(), StrategyKind::Analysis);
        assert_eq!("Cache".parse::<StrategyKind>().unwrap(), StrategyKind::Cache);
        assert!("teleport".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_result_into_outcome() {
        let ok = HijackResult::value(Some("X"), json!(1)).with_metadata("k", true);
        assert_eq!(ok.metadata.get("k"), Some(&json!(true)));
        assert_eq!(ok.into_outcome().unwrap(), json!(1));

        let err = HijackResult::failed(None, CallError::runtime("boom"));
        assert!(err.is_error());
        assert!(!err.executed);
        assert_eq!(err.into_outcome().unwrap_err(), CallError::runtime("boom"));
    }

    #[test]
    fn test_context_qualname() {
        let id = FunctionId::new("math", "add");
        let args = CallArgs::new();
        let ctx = CallContext::new(&id, &args, Environment::Testing, 3);
        assert_eq!(ctx.qualname(), "math.add");
        assert_eq!(ctx.call_count, 3);
    }
}
