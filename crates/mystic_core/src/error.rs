//! Core error types for Mystic.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from parsing and validating core values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed identifier (snapshot id, function name, correlation id)
    InvalidId { reason: String },

    /// Duration literal not of the form `<count><s|m|h|d>`
    InvalidDuration { literal: String },

    /// Value outside the accepted set
    Validation { field: String, reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { reason } => write!(f, "Invalid ID: {}", reason),
            Self::InvalidDuration { literal } => write!(f, "Invalid duration: {:?}", literal),
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidId {
            reason: "not a snapshot id: x".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid ID: not a snapshot id: x");

        let err = CoreError::Validation {
            field: "environment".to_string(),
            reason: "unknown value staging".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Validation failed for environment: unknown value staging"
        );
    }

    #[test]
    fn test_invalid_duration_quotes_literal() {
        let err = CoreError::InvalidDuration {
            literal: "5x".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid duration: \"5x\"");
    }
}
