//! Decoding of transport options into strategies
//!
//! | kind       | options                                             |
//! |------------|-----------------------------------------------------|
//! | `cache`    | `duration`, `max_size`                              |
//! | `mock`     | `mock_data`, `environments`, `per_environment`      |
//! | `block`    | `return_value`, `raise_error`, `message`            |
//! | `redirect` | `target`                                            |
//! | `analyze`  | `track_performance`, `track_arguments`, `track_results` |

use crate::service::ServiceError;
use mystic_core::time::DurationSpec;
use mystic_core::{Environment, Function, Value};
use mystic_hijack::{
    AnalysisStrategy, BlockStrategy, CacheConfig, CacheStrategy, MockData, MockStrategy,
    RedirectStrategy, SharedStrategy, StrategyKind,
};
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Message used by blocks created over the transport
pub const DEFAULT_TRANSPORT_BLOCK_MESSAGE: &str = "Function blocked";

/// Raw option map
pub type Options = Map<String, Value>;

/// Build one strategy of `kind` for `function` from `options`.
///
/// `resolve` looks up redirect targets by qualified name. A cache starts from
/// `cache_defaults` (lifetime, capacity and disk tier); the `duration` and
/// `max_size` options override the first two.
///
/// # Errors
///
/// Returns error for malformed options, unknown redirect targets, or kinds
/// that cannot be described by options
pub fn build_strategy(
    kind: StrategyKind,
    options: &Options,
    cache_defaults: &CacheConfig,
    resolve: impl Fn(&str) -> Option<Function>,
) -> Result<SharedStrategy, ServiceError> {
    let strategy: SharedStrategy = match kind {
        StrategyKind::Cache => {
            let mut config = cache_defaults
                .clone()
                .with_max_size(usize_opt(options, "max_size", cache_defaults.max_size)?);
            if let Some(duration) = duration(options)? {
                config = config.with_ttl(duration);
            }
            Arc::new(CacheStrategy::with_config(config))
        }
        StrategyKind::Mock => {
            let data = match options.get("per_environment") {
                Some(Value::Object(table)) => {
                    let mut values = HashMap::new();
                    for (env, value) in table {
                        values.insert(parse_environment(env)?, value.clone());
                    }
                    MockData::PerEnvironment(values)
                }
                Some(_) => return Err(invalid("per_environment", "expected an object")),
                None => MockData::Static(
                    options
                        .get("mock_data")
                        .cloned()
                        .unwrap_or_else(|| json!({"mocked": true})),
                ),
            };
            let mut strategy = MockStrategy::new(data);
            if let Some(envs) = options.get("environments") {
                let names = envs
                    .as_array()
                    .ok_or_else(|| invalid("environments", "expected an array"))?;
                let parsed = names
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .ok_or_else(|| invalid("environments", "expected strings"))
                            .and_then(parse_environment)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                strategy = strategy.with_environments(parsed);
            }
            Arc::new(strategy)
        }
        StrategyKind::Block => {
            let message = str_opt(options, "message")?.unwrap_or(DEFAULT_TRANSPORT_BLOCK_MESSAGE);
            let strategy = match str_opt(options, "raise_error")? {
                Some(kind) => BlockStrategy::raising(kind),
                None => BlockStrategy::returning(options.get("return_value").cloned().unwrap_or(Value::Null)),
            };
            Arc::new(strategy.with_message(message))
        }
        StrategyKind::Redirect => {
            let target = str_opt(options, "target")?.ok_or_else(|| invalid("target", "required"))?;
            let function =
                resolve(target).ok_or_else(|| ServiceError::UnknownFunction(target.to_string()))?;
            Arc::new(RedirectStrategy::new(function))
        }
        StrategyKind::Analysis => Arc::new(
            AnalysisStrategy::new()
                .with_performance(bool_opt(options, "track_performance", true)?)
                .with_arguments(bool_opt(options, "track_arguments", true)?)
                .with_results(bool_opt(options, "track_results", true)?)
                .with_callback(|ctx, _, sample| {
                    tracing::info!(
                        function = %ctx.qualname(),
                        execution_time = ?sample.execution_time,
                        "analysis sample"
                    );
                }),
        ),
        StrategyKind::Conditional => {
            return Err(ServiceError::UnsupportedStrategy(kind.to_string()));
        }
    };
    Ok(strategy)
}

fn invalid(option: &str, reason: &str) -> ServiceError {
    ServiceError::InvalidOption {
        option: option.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_environment(name: &str) -> Result<Environment, ServiceError> {
    name.parse()
        .map_err(|_| invalid("environments", &format!("unknown environment {:?}", name)))
}

fn duration(options: &Options) -> Result<Option<DurationSpec>, ServiceError> {
    match options.get("duration") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(literal)) => Ok(Some(DurationSpec::from(literal.as_str()))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|secs| Some(DurationSpec::from(Duration::from_secs(secs))))
            .ok_or_else(|| invalid("duration", "expected whole seconds")),
        Some(_) => Err(invalid("duration", "expected a literal like \"1h\" or seconds")),
    }
}

fn str_opt<'a>(options: &'a Options, name: &str) -> Result<Option<&'a str>, ServiceError> {
    match options.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(invalid(name, "expected a string")),
    }
}

fn bool_opt(options: &Options, name: &str, default: bool) -> Result<bool, ServiceError> {
    match options.get(name) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid(name, "expected a boolean")),
    }
}

fn usize_opt(options: &Options, name: &str, default: usize) -> Result<usize, ServiceError> {
    match options.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid(name, "expected a non-negative integer")),
    }
}
