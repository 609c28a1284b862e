//! Result caching strategy.

use super::{timed, CallContext, HijackResult, Priority, Strategy, StrategyKind};
use crate::store::{cache_key, CacheConfig, CacheStore};
use mystic_core::time::DurationSpec;
use mystic_core::Function;
use std::sync::Arc;

/// Caches successful results keyed by function and arguments.
///
/// Always intervenes so it can handle both the hit and the miss path.
/// Errors from the real function are surfaced and never cached.
///
/// A miss writes to every configured tier. The disk tier exists only when
/// the [`CacheConfig`] carries a `cache_dir`; [`CacheStrategy::new`] builds
/// a memory-only cache.
pub struct CacheStrategy {
    store: Arc<CacheStore>,
    priority: Priority,
}

impl CacheStrategy {
    /// Memory-only cache with the given lifetime.
    ///
    /// Use [`CacheStrategy::with_config`] with a `cache_dir` to persist
    /// entries to disk.
    #[must_use]
    pub fn new(duration: impl Into<DurationSpec>) -> Self {
        Self::with_config(CacheConfig::new(duration))
    }

    /// Cache with explicit configuration
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self::from_store(Arc::new(CacheStore::new(config)))
    }

    /// Share an existing store
    #[must_use]
    pub fn from_store(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            priority: Priority::High,
        }
    }

    /// Override the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Whether a valid cached value exists for this call
    #[must_use]
    pub fn has_cached_value(&self, ctx: &CallContext<'_>) -> bool {
        self.store.contains(&cache_key(ctx.function, ctx.args))
    }
}

impl Strategy for CacheStrategy {
    fn name(&self) -> &str {
        "CacheStrategy"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Cache
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn intervene(&self, ctx: &CallContext<'_>, original: &Function) -> HijackResult {
        let key = cache_key(ctx.function, ctx.args);

        if let Some(value) = self.store.get(&key) {
            return HijackResult::value(Some(self.name()), value)
                .with_metadata("cache_hit", true)
                .with_metadata("cache_key", key);
        }

        let (outcome, elapsed) = timed(|| original.call(ctx.args));
        match outcome {
            Ok(value) => {
                self.store.insert(&key, value.clone());
                HijackResult::value(Some(self.name()), value)
                    .with_elapsed(elapsed)
                    .with_metadata("cache_hit", false)
                    .with_metadata("cache_key", key)
            }
            Err(error) => HijackResult::failed(Some(self.name()), error).with_elapsed(elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mystic_core::{CallArgs, CallError, Environment, FunctionId, Value};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_add(calls: Arc<AtomicUsize>) -> Function {
        Function::new(FunctionId::new("math", "add"), move |args: &CallArgs| {
            calls.fetch_add(1, Ordering::SeqCst);
            let x = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
            let y = args.arg(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(x + y))
        })
    }

    #[test]
    fn test_miss_then_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let add = counting_add(calls.clone());
        let strategy = CacheStrategy::new("1h");
        let args = CallArgs::positional([json!(2), json!(3)]);
        let ctx = CallContext::new(add.id(), &args, Environment::Development, 1);

        assert!(!strategy.has_cached_value(&ctx));
        let first = strategy.intervene(&ctx, &add);
        assert_eq!(first.value, json!(5));
        assert_eq!(first.metadata["cache_hit"], json!(false));

        assert!(strategy.has_cached_value(&ctx));
        let second = strategy.intervene(&ctx, &add);
        assert_eq!(second.value, json!(5));
        assert_eq!(second.metadata["cache_hit"], json!(true));
        assert_eq!(second.metadata["cache_key"], first.metadata["cache_key"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_entry_re_executes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let add = counting_add(calls.clone());
        let strategy = CacheStrategy::new(Duration::ZERO);
        let args = CallArgs::positional([json!(1), json!(1)]);
        let ctx = CallContext::new(add.id(), &args, Environment::Development, 1);

        strategy.intervene(&ctx, &add);
        let again = strategy.intervene(&ctx, &add);
        assert_eq!(again.metadata["cache_hit"], json!(false));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let flaky = Function::new(FunctionId::new("net", "fetch"), move |_: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CallError::new("ConnectionError", "down"))
        });
        let strategy = CacheStrategy::new("1h");
        let args = CallArgs::new();
        let ctx = CallContext::new(flaky.id(), &args, Environment::Development, 1);

        let result = strategy.intervene(&ctx, &flaky);
        assert!(!result.executed);
        assert_eq!(result.error.unwrap().kind, "ConnectionError");
        strategy.intervene(&ctx, &flaky);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(strategy.store().is_empty());
    }

    #[test]
    fn test_default_priority_is_high() {
        let strategy = CacheStrategy::new("1h");
        assert_eq!(strategy.priority(), Priority::High);
        assert_eq!(strategy.describe(), "CacheStrategy(priority=HIGH)");
        let lowered = CacheStrategy::new("1h").with_priority(Priority::Low);
        assert_eq!(lowered.priority(), Priority::Low);
    }

    #[test]
    fn test_disk_tier_only_with_cache_dir() {
        assert!(CacheStrategy::new("1h").store().config().cache_dir.is_none());

        let dir = tempfile::tempdir().unwrap();
        let strategy = CacheStrategy::with_config(CacheConfig::new("1h").with_cache_dir(dir.path()));
        assert_eq!(strategy.store().config().cache_dir.as_deref(), Some(dir.path()));
    }
}
