//! Time types for Mystic.
//!
//! Wall clock timestamps tag calls, cache entries and snapshots. Cache
//! lifetimes are written as compact literals such as `30s` or `1h`.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall clock timestamp in UTC
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current wall clock time
#[must_use]
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Lifetime applied when a duration literal cannot be parsed
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Parse a compact duration literal (`<n>s`, `<n>m`, `<n>h` or `<n>d`)
///
/// # Errors
///
/// Returns error if the unit suffix is unknown or the count is not a
/// non-negative integer
pub fn parse_duration_literal(literal: &str) -> CoreResult<Duration> {
    let invalid = || CoreError::InvalidDuration {
        literal: literal.to_string(),
    };

    let trimmed = literal.trim();
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };

    let count: u64 = trimmed[..trimmed.len() - 1].parse().map_err(|_| invalid())?;
    count
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// A lifetime given either as a literal or as an exact duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    /// Compact literal such as `"15m"`
    Literal(String),
    /// Exact duration
    Exact(Duration),
}

impl DurationSpec {
    /// Resolve to a concrete duration.
    ///
    /// Malformed literals resolve to [`DEFAULT_TTL`].
    #[must_use]
    pub fn resolve(&self) -> Duration {
        match self {
            Self::Exact(duration) => *duration,
            Self::Literal(literal) => parse_duration_literal(literal).unwrap_or_else(|err| {
                tracing::debug!(%err, "falling back to default ttl");
                DEFAULT_TTL
            }),
        }
    }
}

impl Default for DurationSpec {
    fn default() -> Self {
        Self::Literal("1h".to_string())
    }
}

impl From<&str> for DurationSpec {
    fn from(literal: &str) -> Self {
        Self::Literal(literal.to_string())
    }
}

impl From<String> for DurationSpec {
    fn from(literal: String) -> Self {
        Self::Literal(literal)
    }
}

impl From<Duration> for DurationSpec {
    fn from(duration: Duration) -> Self {
        Self::Exact(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration_literal("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration_literal("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration_literal("1h").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_duration_literal("2d").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_duration_literal("").is_err());
        assert!(parse_duration_literal("h").is_err());
        assert!(parse_duration_literal("10").is_err());
        assert!(parse_duration_literal("1.5h").is_err());
        assert!(parse_duration_literal("-1m").is_err());
        assert!(parse_duration_literal("3w").is_err());
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        assert_eq!(DurationSpec::from("bogus").resolve(), DEFAULT_TTL);
        assert_eq!(DurationSpec::from("").resolve(), DEFAULT_TTL);
    }

    #[test]
    fn test_resolve_exact() {
        let spec = DurationSpec::from(Duration::from_millis(250));
        assert_eq!(spec.resolve(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_spec_is_one_hour() {
        assert_eq!(DurationSpec::default().resolve(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_spec_deserializes_from_string() {
        let spec: DurationSpec = serde_json::from_str("\"10m\"").unwrap();
        assert_eq!(spec.resolve(), Duration::from_secs(600));
    }

    proptest! {
        #[test]
        fn prop_literal_scales_by_unit(count in 0u64..1_000_000, unit in prop::sample::select(vec!['s', 'm', 'h', 'd'])) {
            let seconds = match unit {
                's' => 1,
                'm' => 60,
                'h' => 3_600,
                _ => 86_400,
            };
            let parsed = parse_duration_literal(&format!("{count}{unit}")).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(count * seconds));
        }
    }
}
