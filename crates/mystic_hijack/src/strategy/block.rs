//! Blocking strategy.

use super::{CallContext, HijackResult, Priority, Strategy, StrategyKind};
use mystic_core::{CallError, Function, Value};

/// Message used when none is configured
pub const DEFAULT_BLOCK_MESSAGE: &str = "Function blocked by BlockStrategy";

/// Prevents the real function from running.
///
/// Either returns a fixed value or raises a configured error kind.
#[derive(Debug, Clone)]
pub struct BlockStrategy {
    return_value: Value,
    raise_error: Option<String>,
    message: String,
    priority: Priority,
}

impl BlockStrategy {
    /// Block and return `Null`
    #[must_use]
    pub fn new() -> Self {
        Self {
            return_value: Value::Null,
            raise_error: None,
            message: DEFAULT_BLOCK_MESSAGE.to_string(),
            priority: Priority::Highest,
        }
    }

    /// Block and return `value`
    #[must_use]
    pub fn returning(value: impl Into<Value>) -> Self {
        Self {
            return_value: value.into(),
            ..Self::new()
        }
    }

    /// Block and raise an error of the given kind
    #[must_use]
    pub fn raising(kind: impl Into<String>) -> Self {
        Self {
            raise_error: Some(kind.into()),
            ..Self::new()
        }
    }

    /// Set the message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Override the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Configured message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for BlockStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BlockStrategy {
    fn name(&self) -> &str {
        "BlockStrategy"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Block
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn intervene(&self, _ctx: &CallContext<'_>, _original: &Function) -> HijackResult {
        let result = match &self.raise_error {
            Some(kind) => {
                HijackResult::failed(Some(self.name()), CallError::new(kind, &self.message))
            }
            None => HijackResult::value(Some(self.name()), self.return_value.clone()),
        };
        result
            .with_metadata("blocked", true)
            .with_metadata("message", self.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mystic_core::{CallArgs, Environment, FunctionId};
    use serde_json::json;

    fn guarded() -> Function {
        Function::new(FunctionId::new("db", "drop_all"), |_: &CallArgs| {
            panic!("original must not run")
        })
    }

    #[test]
    fn test_block_returns_value() {
        let f = guarded();
        let args = CallArgs::new();
        let ctx = CallContext::new(f.id(), &args, Environment::Production, 1);
        let result = BlockStrategy::returning("blocked").intervene(&ctx, &f);

        assert!(result.executed);
        assert_eq!(result.value, json!("blocked"));
        assert_eq!(result.metadata["blocked"], json!(true));
        assert_eq!(result.metadata["message"], json!(DEFAULT_BLOCK_MESSAGE));
    }

    #[test]
    fn test_block_raises() {
        let f = guarded();
        let args = CallArgs::new();
        let ctx = CallContext::new(f.id(), &args, Environment::Production, 1);
        let strategy = BlockStrategy::raising("PermissionError").with_message("not here");
        let err = strategy.intervene(&ctx, &f).into_outcome().unwrap_err();

        assert_eq!(err, CallError::new("PermissionError", "not here"));
    }

    #[test]
    fn test_block_defaults() {
        let strategy = BlockStrategy::default();
        assert_eq!(strategy.priority(), Priority::Highest);
        assert_eq!(strategy.message(), DEFAULT_BLOCK_MESSAGE);
    }
}
