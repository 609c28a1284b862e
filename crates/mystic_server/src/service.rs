//! Transport-facing operations over the hijack and state engines
//!
//! Engine-level usage errors come back as `bool`, `Option` or empty
//! collections. This layer turns them into [`ServiceError`] values so the
//! transport can answer with an explicit failure.

use crate::options::{build_strategy, Options};
use mystic_core::{CallArgs, CallError, Function, MysticConfig, SnapshotId, Timestamp, Value};
use mystic_hijack::{
    CacheConfig, CatalogError, FunctionCatalog, FunctionSummary, NotificationHub, RouterMetrics,
    RouterRegistry, StrategyKind,
};
use mystic_state::{
    Provenance, SnapshotFilter, StateConfig, StateDiff, StateSnapshot, StateStore, StateType,
    TimelinePosition, TimelineSummary,
};
use serde::Serialize;
use serde_json::Map;
use std::sync::Arc;

/// Name of the process-wide timeline
pub const TIMELINE_NAME: &str = "mystic.global_state";

/// Service error
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No function registered under this name
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    /// Function is not hijacked
    #[error("function {0} is not hijacked")]
    NotHijacked(String),
    /// Strategy kind name not recognised
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    /// Strategy kind cannot be built from options
    #[error("strategy {0} cannot be configured over the transport")]
    UnsupportedStrategy(String),
    /// Malformed strategy option
    #[error("invalid option {option}: {reason}")]
    InvalidOption {
        /// Option name
        option: String,
        /// What is wrong with it
        reason: String,
    },
    /// No analysis data for the function
    #[error("no metrics found for {0}")]
    NoMetrics(String),
    /// Snapshot id not in the timeline
    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(SnapshotId),
    /// Time travel target did not resolve
    #[error("cannot travel to {0}")]
    TravelFailed(String),
    /// The called function raised
    #[error(transparent)]
    Call(CallError),
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownFunction(name) => Self::UnknownFunction(name),
            CatalogError::NotHijacked(name) => Self::NotHijacked(name),
            CatalogError::Call(err) => Self::Call(err),
        }
    }
}

/// Service result type
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcome of a hijack request
#[derive(Debug, Clone, Serialize)]
pub struct HijackReport {
    /// Qualified function name
    pub function: String,
    /// Requested strategy kind
    pub strategy: StrategyKind,
    /// Module of the function
    pub module: String,
    /// Function name within the module
    pub function_name: String,
    /// Doc string, when known
    pub doc: Option<String>,
    /// Strategies now installed
    pub strategies: Vec<String>,
    /// Calls dispatched so far
    pub call_count: u64,
}

/// One entry of [`MysticService::list_hijacked`]
#[derive(Debug, Clone, Serialize)]
pub struct HijackedEntry {
    /// Qualified function name
    pub function: String,
    /// Strategies in evaluation order
    pub strategies: Vec<String>,
    /// Calls dispatched so far
    pub call_count: u64,
    /// Full router metrics
    pub metrics: RouterMetrics,
}

/// Analysis summary of one function
#[derive(Debug, Clone, Serialize)]
pub struct FunctionMetrics {
    /// Qualified function name
    pub name: String,
    /// Aggregated samples
    #[serde(flatten)]
    pub summary: FunctionSummary,
}

/// Totals across all analysed functions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsTotals {
    /// Functions with analysis data
    pub total_functions: usize,
    /// Calls across all functions
    pub total_calls: u64,
    /// Seconds spent across all functions
    pub total_time: f64,
    /// Failed calls across all functions
    pub total_exceptions: u64,
}

/// Metrics for every analysed function
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    /// Report time
    pub timestamp: Timestamp,
    /// Per-function summaries
    pub functions: Vec<FunctionMetrics>,
    /// Totals
    pub summary: MetricsTotals,
}

/// Outcome of a time-travel request
#[derive(Debug, Clone, Serialize)]
pub struct TravelReport {
    /// Cursor after travelling
    pub position: usize,
    /// Restored current state
    pub current_state: Map<String, Value>,
}

/// Hijack catalog and state timeline behind one handle
pub struct MysticService {
    catalog: FunctionCatalog,
    state: Arc<StateStore>,
    cache_defaults: CacheConfig,
}

impl MysticService {
    /// Create a service with fresh engines sized from `config`
    #[must_use]
    pub fn new(config: &MysticConfig) -> Self {
        let catalog = FunctionCatalog::new(
            Arc::new(RouterRegistry::new()),
            Arc::new(NotificationHub::new()),
        )
        .with_environment(config.environment);
        let state = StateStore::new(StateConfig::from_config(config).with_name(TIMELINE_NAME));
        Self {
            catalog,
            state: Arc::new(state),
            cache_defaults: CacheConfig::from_config(config),
        }
    }

    /// Use an in-memory cache instead of the configured directory
    #[must_use]
    pub fn without_disk_cache(mut self) -> Self {
        self.cache_defaults.cache_dir = None;
        self
    }

    /// Register the given functions
    #[must_use]
    pub fn with_functions(self, functions: impl IntoIterator<Item = Function>) -> Self {
        for function in functions {
            self.catalog.register(function);
        }
        self
    }

    /// Function catalog
    #[must_use]
    pub fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    /// State timeline
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Registered function names
    #[must_use]
    pub fn functions(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Install a router on `function` with one strategy built from `options`
    ///
    /// # Errors
    ///
    /// Returns error if the function or strategy is unknown or an option is
    /// malformed
    pub fn hijack(&self, function: &str, strategy: &str, options: &Options) -> ServiceResult<HijackReport> {
        let kind: StrategyKind = strategy
            .parse()
            .map_err(|_| ServiceError::UnknownStrategy(strategy.to_string()))?;
        if !self.catalog.contains(function) {
            return Err(ServiceError::UnknownFunction(function.to_string()));
        }
        let built = build_strategy(kind, options, &self.cache_defaults, |name| {
            self.catalog.original(name)
        })?;
        let router = self.catalog.hijack(function, [built])?;
        tracing::info!(function, strategy = %kind, "function hijacked");

        let id = router.id();
        Ok(HijackReport {
            function: function.to_string(),
            strategy: kind,
            module: id.module.clone(),
            function_name: id.name.clone(),
            doc: router.doc().map(str::to_string),
            strategies: router.strategy_names(),
            call_count: router.call_count(),
        })
    }

    /// Remove the router from `function` and return its final metrics
    ///
    /// # Errors
    ///
    /// Returns error if the function is not hijacked
    pub fn unhijack(&self, function: &str) -> ServiceResult<RouterMetrics> {
        let router = self.catalog.unhijack(function)?;
        tracing::info!(function, calls = router.call_count(), "function unhijacked");
        Ok(router.metrics())
    }

    /// Every installed router
    #[must_use]
    pub fn list_hijacked(&self) -> Vec<HijackedEntry> {
        self.catalog
            .registry()
            .all()
            .into_iter()
            .map(|(function, router)| HijackedEntry {
                function,
                strategies: router.strategy_names(),
                call_count: router.call_count(),
                metrics: router.metrics(),
            })
            .collect()
    }

    /// Analysis summaries for all hijacked functions
    #[must_use]
    pub fn get_metrics(&self) -> MetricsReport {
        let functions: Vec<FunctionMetrics> = self
            .catalog
            .registry()
            .all()
            .into_iter()
            .filter_map(|(name, router)| {
                let summary = router.metrics().summaries.into_values().next()?;
                Some(FunctionMetrics { name, summary })
            })
            .collect();

        let summary = functions.iter().fold(MetricsTotals::default(), |mut acc, f| {
            acc.total_functions += 1;
            acc.total_calls += f.summary.call_count;
            acc.total_time += f.summary.total_time;
            acc.total_exceptions += f.summary.exceptions;
            acc
        });

        MetricsReport {
            timestamp: mystic_core::time::now(),
            functions,
            summary,
        }
    }

    /// Analysis summary for one function
    ///
    /// # Errors
    ///
    /// Returns error if the function has no recorded calls
    pub fn get_function_metrics(&self, function: &str) -> ServiceResult<FunctionMetrics> {
        self.catalog
            .router(function)
            .and_then(|router| router.metrics().summaries.into_values().next())
            .filter(|summary| summary.call_count > 0)
            .map(|summary| FunctionMetrics {
                name: function.to_string(),
                summary,
            })
            .ok_or_else(|| ServiceError::NoMetrics(function.to_string()))
    }

    /// Call `function` through its current binding
    ///
    /// # Errors
    ///
    /// Returns error if the function is unknown or raises
    pub fn call(&self, function: &str, args: &CallArgs) -> ServiceResult<Value> {
        Ok(self.catalog.call(function, args)?)
    }

    /// Record a snapshot on the timeline
    pub fn capture(
        &self,
        state_type: StateType,
        data: Map<String, Value>,
        provenance: Provenance,
    ) -> SnapshotId {
        self.state.capture_with(state_type, data, provenance)
    }

    /// Snapshots matching `filter`
    #[must_use]
    pub fn get_state_snapshots(&self, filter: &SnapshotFilter) -> Vec<StateSnapshot> {
        self.state.get_snapshots(filter)
    }

    /// Timeline summary
    #[must_use]
    pub fn timeline(&self) -> TimelineSummary {
        self.state.timeline_summary()
    }

    /// Diff two snapshots
    ///
    /// # Errors
    ///
    /// Returns error if either snapshot is not on the timeline
    pub fn diff(&self, left: SnapshotId, right: SnapshotId) -> ServiceResult<Vec<StateDiff>> {
        for id in [left, right] {
            if self.state.get_snapshot(id).is_none() {
                return Err(ServiceError::UnknownSnapshot(id));
            }
        }
        Ok(self.state.diff(left, right))
    }

    /// Move the timeline cursor
    ///
    /// # Errors
    ///
    /// Returns error if time travel is disabled or the position does not
    /// resolve
    pub fn time_travel(&self, position: TimelinePosition) -> ServiceResult<TravelReport> {
        let label = match &position {
            TimelinePosition::Index(i) => i.to_string(),
            TimelinePosition::Bookmark(name) => name.clone(),
        };
        if !self.state.travel_to(position) {
            return Err(ServiceError::TravelFailed(label));
        }
        Ok(TravelReport {
            position: self.state.position().unwrap_or_default(),
            current_state: self.state.current_state(),
        })
    }
}
