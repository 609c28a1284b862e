//! Environment-aware mocking.

use super::{timed, CallContext, HijackResult, Priority, Strategy, StrategyKind};
use mystic_core::{CallArgs, CallError, Environment, Function, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Value-producing callable used by [`MockData::Generator`]
pub type MockGenerator = Arc<dyn Fn(&CallArgs) -> Result<Value, CallError> + Send + Sync>;

/// Where a mocked value comes from
#[derive(Clone)]
pub enum MockData {
    /// The same value for every call
    Static(Value),
    /// Computed from the call arguments
    Generator(MockGenerator),
    /// Looked up by environment; missing environments yield `Null`
    PerEnvironment(HashMap<Environment, Value>),
}

impl MockData {
    /// Build a generator from a closure
    pub fn generator<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self::Generator(Arc::new(f))
    }

    fn produce(&self, ctx: &CallContext<'_>) -> Result<Value, CallError> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Generator(generate) => generate(ctx.args),
            Self::PerEnvironment(table) => {
                Ok(table.get(&ctx.environment).cloned().unwrap_or(Value::Null))
            }
        }
    }
}

impl From<Value> for MockData {
    fn from(value: Value) -> Self {
        Self::Static(value)
    }
}

impl std::fmt::Debug for MockData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Generator(_) => f.write_str("Generator(..)"),
            Self::PerEnvironment(table) => f.debug_tuple("PerEnvironment").field(table).finish(),
        }
    }
}

/// Replaces results with mock data in selected environments
pub struct MockStrategy {
    data: MockData,
    environments: BTreeSet<Environment>,
    priority: Priority,
}

impl MockStrategy {
    /// Mock active in development and testing
    #[must_use]
    pub fn new(data: impl Into<MockData>) -> Self {
        Self {
            data: data.into(),
            environments: [Environment::Development, Environment::Testing]
                .into_iter()
                .collect(),
            priority: Priority::High,
        }
    }

    /// Restrict to the given environments
    #[must_use]
    pub fn with_environments(mut self, environments: impl IntoIterator<Item = Environment>) -> Self {
        self.environments = environments.into_iter().collect();
        self
    }

    /// Override the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Environments where the mock is active
    #[must_use]
    pub fn environments(&self) -> &BTreeSet<Environment> {
        &self.environments
    }
}

impl Strategy for MockStrategy {
    fn name(&self) -> &str {
        "MockStrategy"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Mock
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn should_intervene(&self, ctx: &CallContext<'_>) -> bool {
        self.environments.contains(&ctx.environment)
    }

    fn intervene(&self, ctx: &CallContext<'_>, _original: &Function) -> HijackResult {
        let (outcome, elapsed) = timed(|| self.data.produce(ctx));
        match outcome {
            Ok(value) => HijackResult::value(Some(self.name()), value)
                .with_elapsed(elapsed)
                .with_metadata("mocked", true)
                .with_metadata("environment", ctx.environment.as_str()),
            Err(error) => HijackResult::failed(Some(self.name()), error).with_elapsed(elapsed),
        }
    }
}
