//! Call arguments and call errors.
//!
//! Hijacked functions take opaque JSON values. Keyword arguments are kept
//! in a sorted map so their canonical text form is stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use serde_json::Value;

/// Positional and keyword arguments of one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    /// Positional arguments in call order
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments sorted by name
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Create empty arguments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from positional arguments only
    #[must_use]
    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            args: args.into_iter().collect(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Append a positional argument
    #[must_use]
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument
    #[must_use]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Positional argument at `index`
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword argument by name
    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Total number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len() + self.kwargs.len()
    }

    /// True when there are no arguments at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Canonical text form of the positional arguments
    #[must_use]
    pub fn args_repr(&self) -> String {
        Value::Array(self.args.clone()).to_string()
    }

    /// Canonical text form of the keyword arguments as sorted pairs
    #[must_use]
    pub fn kwargs_repr(&self) -> String {
        let pairs: Vec<Value> = self
            .kwargs
            .iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
            .collect();
        Value::Array(pairs).to_string()
    }
}

/// An error raised by a hijacked function or a blocking strategy
///
/// `kind` plays the role of the exception type; callers receive the same
/// kind and message whether or not the function is hijacked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CallError {
    /// Error kind, e.g. `RuntimeError`
    pub kind: String,
    /// Human readable message
    pub message: String,
}

impl CallError {
    /// Kind used when none is specified
    pub const DEFAULT_KIND: &'static str = "RuntimeError";

    /// Create a new call error
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a `RuntimeError`
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_KIND, message)
    }

    /// Create a `TypeError`, used for argument mismatches
    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }
}
