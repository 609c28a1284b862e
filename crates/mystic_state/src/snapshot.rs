//! Snapshot records.

use mystic_core::{SnapshotId, Timestamp, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use std::str::FromStr;

/// Semantic category of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    /// A named variable
    Variable,
    /// Arguments of a function call
    FunctionArgs,
    /// Return value of a function call
    FunctionReturn,
    /// A raised error
    Exception,
    /// Process-wide state
    Global,
    /// Function-local state
    Local,
    /// Object attribute
    Attribute,
}

impl StateType {
    /// All state types
    pub const ALL: [StateType; 7] = [
        Self::Variable,
        Self::FunctionArgs,
        Self::FunctionReturn,
        Self::Exception,
        Self::Global,
        Self::Local,
        Self::Attribute,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::FunctionArgs => "function_args",
            Self::FunctionReturn => "function_return",
            Self::Exception => "exception",
            Self::Global => "global",
            Self::Local => "local",
            Self::Attribute => "attribute",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown state type: {}", s))
    }
}

/// An immutable recorded state payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Sequential identifier
    pub id: SnapshotId,
    /// Capture time
    pub timestamp: Timestamp,
    /// Function that produced the state
    pub function_name: Option<String>,
    /// Source line that produced the state
    pub line_number: Option<u32>,
    /// Category
    pub state_type: StateType,
    /// Serialized payload
    pub data: Map<String, Value>,
    /// Free-form metadata (`breakpoint_hit`, `changed_key`, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StateSnapshot {
    /// Whether a breakpoint matched this snapshot
    #[must_use]
    pub fn breakpoint_hit(&self) -> bool {
        self.metadata
            .get("breakpoint_hit")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Rough size of the payload in bytes of JSON text
    #[must_use]
    pub fn payload_size(&self) -> usize {
        Value::Object(self.data.clone()).to_string().len()
    }
}

/// Source location filter. `None` matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Function name, or any function
    pub function_name: Option<String>,
    /// Line number, or any line
    pub line_number: Option<u32>,
}

impl Breakpoint {
    /// Create a breakpoint
    #[must_use]
    pub fn new(function_name: Option<&str>, line_number: Option<u32>) -> Self {
        Self {
            function_name: function_name.map(str::to_string),
            line_number,
        }
    }

    /// Whether a capture with this provenance hits the breakpoint
    #[must_use]
    pub fn matches(&self, function_name: Option<&str>, line_number: Option<u32>) -> bool {
        let function_ok = match &self.function_name {
            Some(expected) => function_name == Some(expected.as_str()),
            None => true,
        };
        let line_ok = match self.line_number {
            Some(expected) => line_number == Some(expected),
            None => true,
        };
        function_ok && line_ok
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = self.function_name.as_deref().unwrap_or("*");
        match self.line_number {
            Some(line) => write!(f, "{}:{}", function, line),
            None => write!(f, "{}:*", function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_type_wire_names() {
        assert_eq!(StateType::FunctionArgs.to_string(), "function_args");
        assert_eq!("exception".parse::<StateType>().unwrap(), StateType::Exception);
        assert!("bogus".parse::<StateType>().is_err());
        let json = serde_json::to_string(&StateType::FunctionReturn).unwrap();
        assert_eq!(json, "\"function_return\"");
    }

    #[test]
    fn test_breakpoint_matching() {
        let exact = Breakpoint::new(Some("load"), Some(12));
        assert!(exact.matches(Some("load"), Some(12)));
        assert!(!exact.matches(Some("load"), Some(13)));
        assert!(!exact.matches(None, Some(12)));

        let any_line = Breakpoint::new(Some("load"), None);
        assert!(any_line.matches(Some("load"), Some(99)));
        assert!(any_line.matches(Some("load"), None));

        let anywhere = Breakpoint::new(None, None);
        assert!(anywhere.matches(None, None));
        assert!(anywhere.matches(Some("x"), Some(1)));
    }

    #[test]
    fn test_breakpoint_display() {
        assert_eq!(Breakpoint::new(Some("load"), Some(12)).to_string(), "load:12");
        assert_eq!(Breakpoint::new(None, Some(3)).to_string(), "*:3");
        assert_eq!(Breakpoint::new(Some("load"), None).to_string(), "load:*");
    }
}
