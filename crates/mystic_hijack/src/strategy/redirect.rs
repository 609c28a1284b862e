//! Redirect calls to a replacement function.

use super::{timed, CallContext, HijackResult, Priority, Strategy, StrategyKind};
use mystic_core::{CallArgs, CallError, Function, Value};
use std::sync::Arc;

/// Rewrites arguments before the replacement is called
pub type ArgsTransform = Arc<dyn Fn(&CallArgs) -> Result<CallArgs, CallError> + Send + Sync>;

/// Rewrites the replacement's result
pub type ResultTransform = Arc<dyn Fn(Value) -> Result<Value, CallError> + Send + Sync>;

/// Calls `target` instead of the original function
pub struct RedirectStrategy {
    target: Function,
    transform_args: Option<ArgsTransform>,
    transform_result: Option<ResultTransform>,
    priority: Priority,
}

impl RedirectStrategy {
    /// Redirect to `target`
    #[must_use]
    pub fn new(target: Function) -> Self {
        Self {
            target,
            transform_args: None,
            transform_result: None,
            priority: Priority::Normal,
        }
    }

    /// Transform arguments before the call
    #[must_use]
    pub fn with_args_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<CallArgs, CallError> + Send + Sync + 'static,
    {
        self.transform_args = Some(Arc::new(f));
        self
    }

    /// Transform the result after the call
    #[must_use]
    pub fn with_result_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.transform_result = Some(Arc::new(f));
        self
    }

    /// Override the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Replacement function
    #[must_use]
    pub fn target(&self) -> &Function {
        &self.target
    }

    fn run(&self, args: &CallArgs) -> Result<Value, CallError> {
        let value = match &self.transform_args {
            Some(transform) => self.target.call(&transform(args)?)?,
            None => self.target.call(args)?,
        };
        match &self.transform_result {
            Some(transform) => transform(value),
            None => Ok(value),
        }
    }
}

impl Strategy for RedirectStrategy {
    fn name(&self) -> &str {
        "RedirectStrategy"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Redirect
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn intervene(&self, ctx: &CallContext<'_>, _original: &Function) -> HijackResult {
        let (outcome, elapsed) = timed(|| self.run(ctx.args));
        match outcome {
            Ok(value) => HijackResult::value(Some(self.name()), value)
                .with_elapsed(elapsed)
                .with_metadata("redirected_to", self.target.qualname()),
            Err(error) => HijackResult::failed(Some(self.name()), error).with_elapsed(elapsed),
        }
    }
}
