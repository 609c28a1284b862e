//! Function identity and callable bodies.
//!
//! The engines never reflect over code. A function is a language-neutral
//! identity (module and name) plus an opaque callable.

use crate::call::{CallArgs, CallError, Value};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Callable body of a function
pub type Callable = Arc<dyn Fn(&CallArgs) -> Result<Value, CallError> + Send + Sync>;

/// Fully-qualified identity of a function
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    /// Module path, e.g. `billing.rates`
    pub module: String,
    /// Function name within the module
    pub name: String,
}

impl FunctionId {
    /// Create a new function identity
    #[must_use]
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// `module.name`, the key used by registries and cache keys
    #[must_use]
    pub fn qualname(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualname())
    }
}

impl FromStr for FunctionId {
    type Err = CoreError;

    /// Splits on the last `.`; a bare name has an empty module.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CoreError::InvalidId {
                reason: "empty function name".to_string(),
            });
        }
        match s.rsplit_once('.') {
            Some((module, name)) if !name.is_empty() => Ok(Self::new(module, name)),
            Some(_) => Err(CoreError::InvalidId {
                reason: format!("function name missing after module: {}", s),
            }),
            None => Ok(Self::new("", s)),
        }
    }
}

/// A named callable with optional documentation
#[derive(Clone)]
pub struct Function {
    id: FunctionId,
    doc: Option<String>,
    body: Callable,
}

impl Function {
    /// Create a function from a closure
    pub fn new<F>(id: FunctionId, body: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            id,
            doc: None,
            body: Arc::new(body),
        }
    }

    /// Create from an already shared callable
    #[must_use]
    pub fn from_callable(id: FunctionId, body: Callable) -> Self {
        Self { id, doc: None, body }
    }

    /// Attach a doc string
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Function identity
    #[must_use]
    pub fn id(&self) -> &FunctionId {
        &self.id
    }

    /// Shorthand for `id().qualname()`
    #[must_use]
    pub fn qualname(&self) -> String {
        self.id.qualname()
    }

    /// Doc string, if any
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Shared callable body
    #[must_use]
    pub fn callable(&self) -> &Callable {
        &self.body
    }

    /// Invoke the function
    ///
    /// # Errors
    ///
    /// Returns whatever error the body raises
    pub fn call(&self, args: &CallArgs) -> Result<Value, CallError> {
        (self.body)(args)
    }

    /// True when both functions share the same callable body
    #[must_use]
    pub fn same_body(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.id)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add() -> Function {
        Function::new(FunctionId::new("math", "add"), |args: &CallArgs| {
            let x = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
            let y = args.arg(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(x + y))
        })
        .with_doc("Add two numbers")
    }

    #[test]
    fn test_qualname() {
        assert_eq!(FunctionId::new("math", "add").qualname(), "math.add");
        assert_eq!(FunctionId::new("", "add").qualname(), "add");
    }

    #[test]
    fn test_parse_function_id() {
        let id: FunctionId = "pkg.mod.fetch".parse().unwrap();
        assert_eq!(id.module, "pkg.mod");
        assert_eq!(id.name, "fetch");

        let bare: FunctionId = "fetch".parse().unwrap();
        assert_eq!(bare.module, "");
        assert!("".parse::<FunctionId>().is_err());
        assert!("pkg.".parse::<FunctionId>().is_err());
    }

    #[test]
    fn test_function_call() {
        let f = add();
        let out = f.call(&CallArgs::positional([json!(2), json!(3)])).unwrap();
        assert_eq!(out, json!(5));
        assert_eq!(f.doc(), Some("Add two numbers"));
    }

    #[test]
    fn test_same_body() {
        let f = add();
        let clone = f.clone();
        assert!(f.same_body(&clone));
        assert!(!f.same_body(&add()));
    }
}
