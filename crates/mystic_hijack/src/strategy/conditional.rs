//! Predicate-selected delegation.

use super::{timed, CallContext, HijackResult, Priority, Strategy, StrategyKind};
use mystic_core::{CallError, Function};
use std::sync::Arc;

/// Decides which branch handles a call. An `Err` counts as "do not
/// intervene".
pub type Predicate = Arc<dyn Fn(&CallContext<'_>) -> Result<bool, CallError> + Send + Sync>;

/// Delegates to one of two strategies based on a predicate.
///
/// Without a false branch, a false predicate leaves the call to the rest of
/// the strategy set.
pub struct ConditionalStrategy {
    predicate: Predicate,
    when_true: Arc<dyn Strategy>,
    when_false: Option<Arc<dyn Strategy>>,
    priority: Priority,
}

impl ConditionalStrategy {
    /// Use `when_true` whenever `predicate` holds
    pub fn new<F>(predicate: F, when_true: Arc<dyn Strategy>) -> Self
    where
        F: Fn(&CallContext<'_>) -> Result<bool, CallError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            when_true,
            when_false: None,
            priority: Priority::Normal,
        }
    }

    /// Use `when_false` when the predicate does not hold
    #[must_use]
    pub fn otherwise(mut self, when_false: Arc<dyn Strategy>) -> Self {
        self.when_false = Some(when_false);
        self
    }

    /// Override the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn branch(&self, ctx: &CallContext<'_>) -> Result<Option<&Arc<dyn Strategy>>, CallError> {
        if (self.predicate)(ctx)? {
            Ok(Some(&self.when_true))
        } else {
            Ok(self.when_false.as_ref())
        }
    }
}

impl Strategy for ConditionalStrategy {
    fn name(&self) -> &str {
        "ConditionalStrategy"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Conditional
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn should_intervene(&self, ctx: &CallContext<'_>) -> bool {
        match self.branch(ctx) {
            Ok(Some(strategy)) => strategy.should_intervene(ctx),
            Ok(None) => false,
            Err(err) => {
                tracing::debug!(function = %ctx.function, %err, "predicate failed");
                false
            }
        }
    }

    fn intervene(&self, ctx: &CallContext<'_>, original: &Function) -> HijackResult {
        match self.branch(ctx) {
            Ok(Some(strategy)) => strategy.intervene(ctx, original),
            Ok(None) => {
                let (outcome, elapsed) = timed(|| original.call(ctx.args));
                HijackResult::from_outcome(Some(self.name()), outcome)
                    .with_elapsed(elapsed)
                    .with_metadata("condition_met", false)
            }
            Err(error) => HijackResult::failed(Some(self.name()), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::MockStrategy;
    use mystic_core::{CallArgs, Environment, FunctionId, Value};
    use serde_json::json;

    fn size_of_first(ctx: &CallContext<'_>) -> Result<bool, CallError> {
        ctx.args
            .arg(0)
            .and_then(Value::as_i64)
            .map(|n| n > 5)
            .ok_or_else(|| CallError::type_error("first argument must be an integer"))
    }

    fn identity() -> Function {
        Function::new(FunctionId::new("util", "identity"), |args: &CallArgs| {
            Ok(args.arg(0).cloned().unwrap_or(Value::Null))
        })
    }

    #[test]
    fn test_selects_branch() {
        let f = identity();
        let strategy = ConditionalStrategy::new(size_of_first, Arc::new(MockStrategy::new(json!("large"))))
            .otherwise(Arc::new(MockStrategy::new(json!("small"))));

        let big = CallArgs::positional([json!(10)]);
        let ctx = CallContext::new(f.id(), &big, Environment::Development, 1);
        assert!(strategy.should_intervene(&ctx));
        assert_eq!(strategy.intervene(&ctx, &f).value, json!("large"));

        let small = CallArgs::positional([json!(3)]);
        let ctx = CallContext::new(f.id(), &small, Environment::Development, 2);
        assert_eq!(strategy.intervene(&ctx, &f).value, json!("small"));
    }

    #[test]
    fn test_false_without_branch_does_not_intervene() {
        let f = identity();
        let strategy =
            ConditionalStrategy::new(size_of_first, Arc::new(MockStrategy::new(json!("large"))));
        let args = CallArgs::positional([json!(1)]);
        let ctx = CallContext::new(f.id(), &args, Environment::Development, 1);

        assert!(!strategy.should_intervene(&ctx));
        let result = strategy.intervene(&ctx, &f);
        assert_eq!(result.value, json!(1));
        assert_eq!(result.metadata["condition_met"], json!(false));
    }

    #[test]
    fn test_predicate_error_means_no_intervention() {
        let f = identity();
        let strategy =
            ConditionalStrategy::new(size_of_first, Arc::new(MockStrategy::new(json!("large"))));
        let args = CallArgs::positional([json!("ten")]);
        let ctx = CallContext::new(f.id(), &args, Environment::Development, 1);

        assert!(!strategy.should_intervene(&ctx));
        assert!(strategy.intervene(&ctx, &f).is_error());
    }

    #[test]
    fn test_branch_decision_respects_inner_strategy() {
        let f = identity();
        let prod_only = MockStrategy::new(json!("mocked")).with_environments([Environment::Production]);
        let strategy = ConditionalStrategy::new(|_: &CallContext<'_>| Ok(true), Arc::new(prod_only));
        let args = CallArgs::new();
        let ctx = CallContext::new(f.id(), &args, Environment::Development, 1);
        assert!(!strategy.should_intervene(&ctx));
    }
}
