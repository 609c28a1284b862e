//! Call router: the wrapper installed in place of a hijacked function.
//!
//! The router owns the original function, a priority-sorted strategy set
//! and a call counter. Each call takes a snapshot of the strategy set, so
//! concurrent mutation never tears a dispatch in progress. The function
//! body itself runs without any router lock held.

use crate::notify::{CallNotification, NotificationHub};
use crate::strategy::{
    timed, AnalysisStrategy, BlockStrategy, CacheStrategy, CallContext, CallSample,
    FunctionSummary, HijackResult, MockData, MockStrategy, RedirectStrategy, Strategy,
    StrategyKind,
};
use mystic_core::time::DurationSpec;
use mystic_core::{CallArgs, CallError, Environment, Function, FunctionId, Value};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared strategy handle
pub type SharedStrategy = Arc<dyn Strategy>;

/// Router state reported to the transport layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterMetrics {
    /// Qualified function name
    pub function: String,
    /// Calls dispatched so far
    pub call_count: u64,
    /// Router environment
    pub environment: Environment,
    /// `Name(priority=LEVEL)` for each strategy, in evaluation order
    pub strategies: Vec<String>,
    /// Samples recorded by analysis strategies, keyed by strategy name
    pub strategy_metrics: BTreeMap<String, BTreeMap<String, Vec<CallSample>>>,
    /// Summary of this function per analysis strategy
    pub summaries: BTreeMap<String, FunctionSummary>,
}

/// Interception wrapper around one function
pub struct CallRouter {
    original: Function,
    strategies: RwLock<Vec<SharedStrategy>>,
    call_count: AtomicU64,
    environment: Environment,
    hub: Option<Arc<NotificationHub>>,
}

impl CallRouter {
    /// Wrap `original` with an empty strategy set
    #[must_use]
    pub fn new(original: Function) -> Self {
        Self {
            original,
            strategies: RwLock::new(Vec::new()),
            call_count: AtomicU64::new(0),
            environment: Environment::default(),
            hub: None,
        }
    }

    /// Set the environment tag passed to strategies
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Publish call notifications to `hub`
    #[must_use]
    pub fn with_hub(mut self, hub: Arc<NotificationHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Add a strategy
    #[must_use]
    pub fn with_strategy(self, strategy: impl Strategy + 'static) -> Self {
        self.add_strategy(Arc::new(strategy));
        self
    }

    /// Add several shared strategies
    #[must_use]
    pub fn with_strategies(self, strategies: impl IntoIterator<Item = SharedStrategy>) -> Self {
        for strategy in strategies {
            self.add_strategy(strategy);
        }
        self
    }

    /// Append a default analysis strategy
    #[must_use]
    pub fn with_auto_analysis(self) -> Self {
        self.with_strategy(AnalysisStrategy::new())
    }

    /// Identity of the wrapped function
    #[must_use]
    pub fn id(&self) -> &FunctionId {
        self.original.id()
    }

    /// Qualified name of the wrapped function
    #[must_use]
    pub fn qualname(&self) -> String {
        self.original.qualname()
    }

    /// Doc string of the wrapped function
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.original.doc()
    }

    /// The original function
    #[must_use]
    pub fn wrapped(&self) -> &Function {
        &self.original
    }

    /// Router environment
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Calls dispatched so far
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Insert a strategy, keeping the set sorted by priority. Strategies of
    /// equal priority keep insertion order.
    pub fn add_strategy(&self, strategy: SharedStrategy) {
        let mut strategies = self.strategies.write();
        strategies.push(strategy);
        strategies.sort_by_key(|s| s.priority());
    }

    /// Remove every strategy of `kind`, returning how many were removed
    pub fn remove_strategies(&self, kind: StrategyKind) -> usize {
        let mut strategies = self.strategies.write();
        let before = strategies.len();
        strategies.retain(|s| s.kind() != kind);
        before - strategies.len()
    }

    /// Current strategy set in evaluation order
    #[must_use]
    pub fn strategies(&self) -> Vec<SharedStrategy> {
        self.strategies.read().clone()
    }

    /// `Name(priority=LEVEL)` for each strategy
    #[must_use]
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.read().iter().map(|s| s.describe()).collect()
    }

    /// Dispatch a call.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the handling strategy or by the original
    /// function, unchanged
    pub fn call(&self, args: &CallArgs) -> Result<Value, CallError> {
        self.dispatch(args).into_outcome()
    }

    /// Dispatch a call and return the full result envelope
    #[must_use]
    pub fn dispatch(&self, args: &CallArgs) -> HijackResult {
        let call_count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = CallContext::new(self.original.id(), args, self.environment, call_count);
        let strategies = self.strategies();

        let chosen = strategies.iter().find(|s| s.should_intervene(&ctx));
        let result = match chosen {
            Some(strategy) => {
                tracing::debug!(
                    function = %ctx.function,
                    strategy = strategy.name(),
                    call_count,
                    "strategy intervened"
                );
                strategy.intervene(&ctx, &self.original)
            }
            None => {
                tracing::debug!(function = %ctx.function, call_count, "pass-through");
                let (outcome, elapsed) = timed(|| self.original.call(args));
                HijackResult::from_outcome(None, outcome).with_elapsed(elapsed)
            }
        };

        if let Some(hub) = &self.hub {
            hub.publish(&CallNotification::new(&ctx, &result));
        }
        result
    }

    /// Metrics snapshot including analysis samples
    #[must_use]
    pub fn metrics(&self) -> RouterMetrics {
        let qualname = self.qualname();
        let strategies = self.strategies();

        let mut strategy_metrics = BTreeMap::new();
        let mut summaries = BTreeMap::new();
        for analysis in strategies.iter().filter_map(|s| s.as_analysis()) {
            strategy_metrics.insert(
                analysis.name().to_string(),
                analysis.samples(Some(qualname.as_str())),
            );
            summaries.insert(
                analysis.name().to_string(),
                analysis.summary(&qualname).unwrap_or_default(),
            );
        }

        RouterMetrics {
            function: qualname,
            call_count: self.call_count(),
            environment: self.environment,
            strategies: strategies.iter().map(|s| s.describe()).collect(),
            strategy_metrics,
            summaries,
        }
    }
}

impl std::fmt::Debug for CallRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRouter")
            .field("function", self.original.id())
            .field("strategies", &self.strategy_names())
            .field("call_count", &self.call_count())
            .field("environment", &self.environment)
            .finish()
    }
}

/// Wrap `function` with the given strategies
#[must_use]
pub fn hijack_function(
    function: Function,
    strategies: impl IntoIterator<Item = SharedStrategy>,
) -> CallRouter {
    CallRouter::new(function).with_strategies(strategies)
}

/// Wrap with a memory-only cache.
///
/// For a disk-backed cache build the strategy with
/// [`CacheStrategy::with_config`] and pass it to [`hijack_function`].
#[must_use]
pub fn cache(function: Function, duration: impl Into<DurationSpec>) -> CallRouter {
    CallRouter::new(function).with_strategy(CacheStrategy::new(duration))
}

/// Wrap with a mock active in development and testing
#[must_use]
pub fn mock(function: Function, data: impl Into<MockData>) -> CallRouter {
    CallRouter::new(function).with_strategy(MockStrategy::new(data))
}

/// Wrap with a block returning `return_value`
#[must_use]
pub fn block(function: Function, return_value: impl Into<Value>) -> CallRouter {
    CallRouter::new(function)
        .with_strategy(BlockStrategy::returning(return_value).with_message("Blocked"))
}

/// Wrap with a redirect to `target`
#[must_use]
pub fn redirect(function: Function, target: Function) -> CallRouter {
    CallRouter::new(function).with_strategy(RedirectStrategy::new(target))
}

/// Wrap with a default analysis strategy
#[must_use]
pub fn analyze(function: Function) -> CallRouter {
    CallRouter::new(function).with_auto_analysis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{ConditionalStrategy, Priority};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn add() -> Function {
        Function::new(FunctionId::new("math", "add"), |args: &CallArgs| {
            let x = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
            let y = args.arg(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(x + y))
        })
        .with_doc("Add two integers")
    }

    fn two_three() -> CallArgs {
        CallArgs::positional([json!(2), json!(3)])
    }

    #[test]
    fn test_pass_through_without_strategies() {
        let router = CallRouter::new(add());
        let result = router.dispatch(&two_three());
        assert_eq!(result.value, json!(5));
        assert_eq!(result.strategy, None);
        assert_eq!(router.call_count(), 1);
    }

    #[test]
    fn test_identity_is_preserved() {
        let original = add();
        let router = CallRouter::new(original.clone());
        assert_eq!(router.qualname(), "math.add");
        assert_eq!(router.doc(), Some("Add two integers"));
        assert!(router.wrapped().same_body(&original));
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let router = cache(add(), "1h");
        let first = router.dispatch(&two_three());
        assert_eq!(first.value, json!(5));
        assert_eq!(first.metadata["cache_hit"], json!(false));

        let second = router.dispatch(&two_three());
        assert_eq!(second.value, json!(5));
        assert_eq!(second.metadata["cache_hit"], json!(true));
    }

    #[test]
    fn test_cache_expiry_re_executes() {
        let router = cache(add(), Duration::ZERO);
        router.dispatch(&two_three());
        let again = router.dispatch(&two_three());
        assert_eq!(again.metadata["cache_hit"], json!(false));
    }

    #[test]
    fn test_block_returns_value() {
        let router = block(add(), "blocked");
        assert_eq!(router.call(&two_three()).unwrap(), json!("blocked"));
    }

    #[test]
    fn test_block_raises_configured_error() {
        let router = CallRouter::new(add()).with_strategy(BlockStrategy::raising("RuntimeError"));
        let err = router.call(&two_three()).unwrap_err();
        assert_eq!(err.kind, "RuntimeError");
    }

    #[test]
    fn test_block_beats_mock_regardless_of_order() {
        let mock_first = CallRouter::new(add())
            .with_strategy(MockStrategy::new(json!("mocked")))
            .with_strategy(BlockStrategy::returning("blocked"));
        let block_first = CallRouter::new(add())
            .with_strategy(BlockStrategy::returning("blocked"))
            .with_strategy(MockStrategy::new(json!("mocked")));

        for router in [mock_first, block_first] {
            assert_eq!(router.call(&two_three()).unwrap(), json!("blocked"));
            assert_eq!(router.strategy_names()[0], "BlockStrategy(priority=HIGHEST)");
        }
    }

    #[test]
    fn test_removing_kind_restores_pass_through() {
        let router = CallRouter::new(add())
            .with_strategy(BlockStrategy::returning("blocked"))
            .with_strategy(BlockStrategy::returning("also blocked").with_priority(Priority::Low));

        assert_eq!(router.remove_strategies(StrategyKind::Block), 2);
        assert_eq!(router.remove_strategies(StrategyKind::Block), 0);
        assert_eq!(router.call(&two_three()).unwrap(), json!(5));
    }

    #[test]
    fn test_analysis_observes_unchanged_value() {
        let router = analyze(add());
        assert_eq!(router.call(&two_three()).unwrap(), json!(5));

        let metrics = router.metrics();
        assert_eq!(metrics.call_count, 1);
        assert_eq!(metrics.strategies, vec!["AnalysisStrategy(priority=LOW)"]);
        let samples = &metrics.strategy_metrics["AnalysisStrategy"]["math.add"];
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].result, Some(json!(5)));
        assert_eq!(metrics.summaries["AnalysisStrategy"].call_count, 1);
    }

    #[test]
    fn test_original_error_propagates_verbatim() {
        let failing = Function::new(FunctionId::new("io", "read"), |_: &CallArgs| {
            Err(CallError::new("FileNotFoundError", "config.toml"))
        });
        let router = analyze(failing);
        let err = router.call(&CallArgs::new()).unwrap_err();
        assert_eq!(err, CallError::new("FileNotFoundError", "config.toml"));
    }

    #[test]
    fn test_conditional_mock_branches() {
        let conditional = ConditionalStrategy::new(
            |ctx: &CallContext<'_>| {
                Ok(ctx.args.arg(0).and_then(Value::as_i64).is_some_and(|n| n > 5))
            },
            Arc::new(MockStrategy::new(json!("large"))),
        )
        .otherwise(Arc::new(MockStrategy::new(json!("small"))));
        let router = CallRouter::new(add()).with_strategy(conditional);

        assert_eq!(router.call(&CallArgs::positional([json!(10)])).unwrap(), json!("large"));
        assert_eq!(router.call(&CallArgs::positional([json!(3)])).unwrap(), json!("small"));
    }

    #[test]
    fn test_mock_skipped_outside_environment() {
        let router = mock(add(), json!("mocked")).with_environment(Environment::Production);
        assert_eq!(router.call(&two_three()).unwrap(), json!(5));
    }

    #[test]
    fn test_redirect_shortcut() {
        let target = Function::new(FunctionId::new("math", "mul"), |args: &CallArgs| {
            let x = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
            let y = args.arg(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(x * y))
        });
        let router = redirect(add(), target);
        let result = router.dispatch(&two_three());
        assert_eq!(result.value, json!(6));
        assert_eq!(result.metadata["redirected_to"], json!("math.mul"));
    }

    #[test]
    fn test_notifications_published_for_every_call() {
        let hub = Arc::new(NotificationHub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        hub.subscribe(move |n| {
            sink.lock().push((n.call_count, n.strategy.clone(), n.error.clone()));
            Ok(())
        });

        let router = CallRouter::new(add())
            .with_hub(hub)
            .with_strategy(BlockStrategy::raising("RuntimeError").with_message("nope"));
        assert!(router.call(&two_three()).is_err());
        router.remove_strategies(StrategyKind::Block);
        assert!(router.call(&two_three()).is_ok());

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            (1, Some("BlockStrategy".to_string()), Some("RuntimeError: nope".to_string()))
        );
        assert_eq!(seen[1], (2, None, None));
    }

    #[test]
    fn test_concurrent_calls_count_exactly() {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = executions.clone();
        let f = Function::new(FunctionId::new("work", "tick"), move |_: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let router = Arc::new(CallRouter::new(f));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let router = router.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        router.call(&CallArgs::new()).unwrap();
                    }
                    if i % 2 == 0 {
                        router.add_strategy(Arc::new(AnalysisStrategy::new()));
                    } else {
                        router.remove_strategies(StrategyKind::Analysis);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(router.call_count(), 400);
        assert_eq!(executions.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn test_auto_analysis_appends_strategy() {
        let router = hijack_function(add(), [Arc::new(CacheStrategy::new("1h")) as SharedStrategy])
            .with_auto_analysis();
        assert_eq!(
            router.strategy_names(),
            vec!["CacheStrategy(priority=HIGH)", "AnalysisStrategy(priority=LOW)"]
        );
    }
}
