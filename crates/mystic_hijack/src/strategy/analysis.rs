//! Call analysis.
//!
//! Observes calls without changing them: the original always runs, its
//! value or error is passed through untouched, and a sample is recorded per
//! function.

use super::{timed, CallContext, HijackResult, Priority, Strategy, StrategyKind};
use mystic_core::{CallArgs, Function, Timestamp, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Invoked after each successful analysed call
pub type AnalysisCallback = Arc<dyn Fn(&CallContext<'_>, &Value, &CallSample) + Send + Sync>;

/// One observed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSample {
    /// When the call finished
    pub timestamp: Timestamp,
    /// Wall time in seconds, when performance tracking is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    /// Whether the call returned a value
    pub success: bool,
    /// Arguments, when argument tracking is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<CallArgs>,
    /// Result, when result tracking is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Length of the rendered result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size: Option<usize>,
    /// Error text of a failed call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallSample {
    fn to_metadata(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Aggregate timing for one function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSummary {
    /// Observed calls
    pub call_count: u64,
    /// Sum of timed calls in seconds
    pub total_time: f64,
    /// Fastest timed call
    pub min_time: f64,
    /// Slowest timed call
    pub max_time: f64,
    /// Mean of timed calls
    pub avg_time: f64,
    /// Failed calls
    pub exceptions: u64,
    /// Most recent call
    pub last_called: Option<Timestamp>,
    #[serde(skip)]
    timed_calls: u64,
}

impl FunctionSummary {
    /// Fold a sample into the summary
    pub fn record(&mut self, sample: &CallSample) {
        self.call_count += 1;
        if !sample.success {
            self.exceptions += 1;
        }
        if let Some(time) = sample.execution_time {
            if self.timed_calls == 0 {
                self.min_time = time;
                self.max_time = time;
            } else {
                self.min_time = self.min_time.min(time);
                self.max_time = self.max_time.max(time);
            }
            self.timed_calls += 1;
            self.total_time += time;
            self.avg_time = self.total_time / self.timed_calls as f64;
        }
        self.last_called = Some(
            self.last_called
                .map_or(sample.timestamp, |last| last.max(sample.timestamp)),
        );
    }

    /// Summarise a list of samples
    #[must_use]
    pub fn from_samples(samples: &[CallSample]) -> Self {
        let mut summary = Self::default();
        for sample in samples {
            summary.record(sample);
        }
        summary
    }
}

/// Records per-call samples while always running the original function
pub struct AnalysisStrategy {
    track_performance: bool,
    track_arguments: bool,
    track_results: bool,
    callback: Option<AnalysisCallback>,
    samples: Mutex<BTreeMap<String, Vec<CallSample>>>,
    priority: Priority,
}

impl AnalysisStrategy {
    /// Track timing, arguments and results
    #[must_use]
    pub fn new() -> Self {
        Self {
            track_performance: true,
            track_arguments: true,
            track_results: true,
            callback: None,
            samples: Mutex::new(BTreeMap::new()),
            priority: Priority::Low,
        }
    }

    /// Toggle timing capture
    #[must_use]
    pub fn with_performance(mut self, enabled: bool) -> Self {
        self.track_performance = enabled;
        self
    }

    /// Toggle argument capture
    #[must_use]
    pub fn with_arguments(mut self, enabled: bool) -> Self {
        self.track_arguments = enabled;
        self
    }

    /// Toggle result capture
    #[must_use]
    pub fn with_results(mut self, enabled: bool) -> Self {
        self.track_results = enabled;
        self
    }

    /// Invoke `callback` after each successful call
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CallContext<'_>, &Value, &CallSample) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Override the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Samples for one function, or for all of them
    #[must_use]
    pub fn samples(&self, function: Option<&str>) -> BTreeMap<String, Vec<CallSample>> {
        let samples = self.samples.lock();
        match function {
            Some(name) => BTreeMap::from([(
                name.to_string(),
                samples.get(name).cloned().unwrap_or_default(),
            )]),
            None => samples.clone(),
        }
    }

    /// Summary for one function
    #[must_use]
    pub fn summary(&self, function: &str) -> Option<FunctionSummary> {
        self.samples
            .lock()
            .get(function)
            .map(|samples| FunctionSummary::from_samples(samples))
    }

    /// Summaries for every observed function
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<String, FunctionSummary> {
        self.samples
            .lock()
            .iter()
            .map(|(name, samples)| (name.clone(), FunctionSummary::from_samples(samples)))
            .collect()
    }

    /// Drop recorded samples
    pub fn reset(&self) {
        self.samples.lock().clear();
    }

    fn record(&self, function: String, sample: CallSample) {
        self.samples.lock().entry(function).or_default().push(sample);
    }
}

impl Default for AnalysisStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for AnalysisStrategy {
    fn name(&self) -> &str {
        "AnalysisStrategy"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Analysis
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn intervene(&self, ctx: &CallContext<'_>, original: &Function) -> HijackResult {
        let (outcome, elapsed) = timed(|| original.call(ctx.args));
        let execution_time = self.track_performance.then(|| elapsed.as_secs_f64());
        let timestamp = mystic_core::time::now();

        match outcome {
            Ok(value) => {
                let sample = CallSample {
                    timestamp,
                    execution_time,
                    success: true,
                    args: self.track_arguments.then(|| ctx.args.clone()),
                    result: self.track_results.then(|| value.clone()),
                    result_size: self.track_results.then(|| value.to_string().len()),
                    error: None,
                };
                self.record(ctx.qualname(), sample.clone());
                if let Some(callback) = &self.callback {
                    callback(ctx, &value, &sample);
                }
                HijackResult::value(Some(self.name()), value)
                    .with_elapsed(elapsed)
                    .with_metadata_map(sample.to_metadata())
            }
            Err(error) => {
                let sample = CallSample {
                    timestamp,
                    execution_time,
                    success: false,
                    args: None,
                    result: None,
                    result_size: None,
                    error: Some(error.to_string()),
                };
                let metadata = sample.to_metadata();
                self.record(ctx.qualname(), sample);
                HijackResult::failed(Some(self.name()), error)
                    .with_elapsed(elapsed)
                    .with_metadata_map(metadata)
            }
        }
    }

    fn as_analysis(&self) -> Option<&AnalysisStrategy> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mystic_core::{CallError, Environment, FunctionId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn square() -> Function {
        Function::new(FunctionId::new("math", "square"), |args: &CallArgs| {
            let n = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * n))
        })
    }

    #[test]
    fn test_passes_value_through() {
        let f = square();
        let args = CallArgs::positional([json!(7)]);
        let ctx = CallContext::new(f.id(), &args, Environment::Production, 1);
        let strategy = AnalysisStrategy::new();

        let result = strategy.intervene(&ctx, &f);
        assert_eq!(result.value, json!(49));
        assert_eq!(result.metadata["success"], json!(true));
        assert_eq!(result.metadata["result_size"], json!(2));

        let samples = strategy.samples(Some("math.square"));
        assert_eq!(samples["math.square"].len(), 1);
        assert_eq!(samples["math.square"][0].args, Some(args.clone()));
    }

    #[test]
    fn test_records_errors_and_passes_them_through() {
        let failing = Function::new(FunctionId::new("io", "read"), |_: &CallArgs| {
            Err(CallError::new("IOError", "disk gone"))
        });
        let args = CallArgs::new();
        let ctx = CallContext::new(failing.id(), &args, Environment::Development, 1);
        let strategy = AnalysisStrategy::new();

        let result = strategy.intervene(&ctx, &failing);
        assert_eq!(result.error, Some(CallError::new("IOError", "disk gone")));
        assert_eq!(result.metadata["success"], json!(false));

        let summary = strategy.summary("io.read").unwrap();
        assert_eq!(summary.call_count, 1);
        assert_eq!(summary.exceptions, 1);
    }

    #[test]
    fn test_tracking_switches() {
        let f = square();
        let args = CallArgs::positional([json!(3)]);
        let ctx = CallContext::new(f.id(), &args, Environment::Development, 1);
        let strategy = AnalysisStrategy::new()
            .with_performance(false)
            .with_arguments(false)
            .with_results(false);

        strategy.intervene(&ctx, &f);
        let sample = &strategy.samples(None)["math.square"][0];
        assert_eq!(sample.execution_time, None);
        assert_eq!(sample.args, None);
        assert_eq!(sample.result, None);
    }

    #[test]
    fn test_callback_runs_on_success() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let f = square();
        let args = CallArgs::positional([json!(2)]);
        let ctx = CallContext::new(f.id(), &args, Environment::Development, 1);
        let strategy = AnalysisStrategy::new().with_callback(move |_, value, _| {
            assert_eq!(value, &json!(4));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        strategy.intervene(&ctx, &f);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_summary_aggregates() {
        let base = mystic_core::time::now();
        let sample = |time: f64, success: bool| CallSample {
            timestamp: base,
            execution_time: Some(time),
            success,
            args: None,
            result: None,
            result_size: None,
            error: None,
        };
        let summary =
            FunctionSummary::from_samples(&[sample(0.5, true), sample(1.5, false), sample(1.0, true)]);

        assert_eq!(summary.call_count, 3);
        assert_eq!(summary.exceptions, 1);
        assert!((summary.total_time - 3.0).abs() < 1e-9);
        assert!((summary.min_time - 0.5).abs() < 1e-9);
        assert!((summary.max_time - 1.5).abs() < 1e-9);
        assert!((summary.avg_time - 1.0).abs() < 1e-9);
        assert_eq!(summary.last_called, Some(base));
    }

    #[test]
    fn test_reset() {
        let f = square();
        let args = CallArgs::positional([json!(1)]);
        let ctx = CallContext::new(f.id(), &args, Environment::Development, 1);
        let strategy = AnalysisStrategy::new();
        strategy.intervene(&ctx, &f);
        strategy.reset();
        assert!(strategy.summaries().is_empty());
    }
}
