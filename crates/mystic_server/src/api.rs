//! HTTP API

use crate::middleware::correlation_id;
use crate::options::Options;
use crate::service::{MysticService, ServiceError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mystic_core::{CallArgs, SnapshotId, Value};
use mystic_state::{Provenance, SnapshotFilter, StateType, TimelinePosition};
use serde::Deserialize;
use serde_json::{json, Map};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Snapshots returned when a request gives no limit
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 10;

type Shared = State<Arc<MysticService>>;
type ApiResult = Result<Json<Value>, ServiceError>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownFunction(_) | Self::NoMetrics(_) | Self::UnknownSnapshot(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::BAD_REQUEST,
        };
        let kind = match &self {
            Self::Call(err) => err.kind.clone(),
            _ => "ServiceError".to_string(),
        };
        tracing::debug!(error = %self, %status, "request failed");
        let body = json!({
            "success": false,
            "error": self.to_string(),
            "type": kind,
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct HijackRequest {
    function: String,
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default)]
    options: Options,
}

fn default_strategy() -> String {
    "cache".to_string()
}

#[derive(Debug, Deserialize)]
struct FunctionRequest {
    function: String,
}

#[derive(Debug, Deserialize)]
struct CallRequest {
    function: String,
    #[serde(flatten)]
    args: CallArgs,
}

#[derive(Debug, Deserialize)]
struct CaptureRequest {
    #[serde(default = "default_state_type")]
    state_type: StateType,
    data: Map<String, Value>,
    #[serde(default)]
    function_name: Option<String>,
    #[serde(default)]
    line_number: Option<u32>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

fn default_state_type() -> StateType {
    StateType::Global
}

#[derive(Debug, Deserialize)]
struct DiffRequest {
    left: SnapshotId,
    right: SnapshotId,
}

#[derive(Debug, Deserialize)]
struct TravelRequest {
    position: TimelinePosition,
}

/// Build the application router
pub fn router(service: Arc<MysticService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/functions", get(list_functions))
        .route("/api/functions/hijack", post(hijack))
        .route("/api/functions/unhijack", post(unhijack))
        .route("/api/functions/call", post(call))
        .route("/api/hijacked", get(list_hijacked))
        .route("/api/metrics", get(all_metrics))
        .route("/api/metrics/{function}", get(function_metrics))
        .route("/api/state/snapshots", post(snapshots))
        .route("/api/state/capture", post(capture))
        .route("/api/state/timeline", get(timeline))
        .route("/api/state/diff", post(diff))
        .route("/api/state/travel", post(travel))
        .layer(axum::middleware::from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn health(State(service): Shared) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": mystic_core::time::now(),
        "components": {
            "hijacker": "ready",
            "state_manager": "ready",
        },
        "hijacked": service.list_hijacked().len(),
    }))
}

async fn list_functions(State(service): Shared) -> Json<Value> {
    let functions = service.functions();
    Json(json!({
        "success": true,
        "count": functions.len(),
        "functions": functions,
    }))
}

async fn hijack(State(service): Shared, Json(req): Json<HijackRequest>) -> ApiResult {
    let report = service.hijack(&req.function, &req.strategy, &req.options)?;
    Ok(Json(json!({
        "success": true,
        "function": req.function,
        "strategy": req.strategy,
        "status": "hijacked",
        "details": report,
    })))
}

async fn unhijack(State(service): Shared, Json(req): Json<FunctionRequest>) -> ApiResult {
    let metrics = service.unhijack(&req.function)?;
    Ok(Json(json!({
        "success": true,
        "function": req.function,
        "status": "unhijacked",
        "metrics": metrics,
    })))
}

async fn call(State(service): Shared, Json(req): Json<CallRequest>) -> ApiResult {
    let result = service.call(&req.function, &req.args)?;
    Ok(Json(json!({
        "success": true,
        "function": req.function,
        "result": result,
    })))
}

async fn list_hijacked(State(service): Shared) -> Json<Value> {
    let hijacked = service.list_hijacked();
    Json(json!({
        "success": true,
        "count": hijacked.len(),
        "hijacked_functions": hijacked,
    }))
}

async fn all_metrics(State(service): Shared) -> Json<Value> {
    let report = service.get_metrics();
    Json(json!({
        "success": true,
        "timestamp": report.timestamp,
        "functions": report.functions,
        "summary": report.summary,
    }))
}

async fn function_metrics(State(service): Shared, Path(function): Path<String>) -> ApiResult {
    let metrics = service.get_function_metrics(&function)?;
    Ok(Json(json!({
        "success": true,
        "function": function,
        "metrics": metrics.summary,
    })))
}

async fn snapshots(State(service): Shared, Json(mut filter): Json<SnapshotFilter>) -> Json<Value> {
    filter.limit = filter.limit.or(Some(DEFAULT_SNAPSHOT_LIMIT));
    Json(json!({
        "success": true,
        "snapshots": service.get_state_snapshots(&filter),
        "timeline": service.timeline(),
    }))
}

async fn capture(State(service): Shared, Json(req): Json<CaptureRequest>) -> Json<Value> {
    let provenance = Provenance {
        function_name: req.function_name,
        line_number: req.line_number,
        metadata: req.metadata,
    };
    let id = service.capture(req.state_type, req.data, provenance);
    Json(json!({
        "success": true,
        "snapshot_id": id,
    }))
}

async fn timeline(State(service): Shared) -> Json<Value> {
    Json(json!({
        "success": true,
        "timeline": service.timeline(),
    }))
}

async fn diff(State(service): Shared, Json(req): Json<DiffRequest>) -> ApiResult {
    let diffs = service.diff(req.left, req.right)?;
    Ok(Json(json!({
        "success": true,
        "left": req.left,
        "right": req.right,
        "count": diffs.len(),
        "diffs": diffs,
    })))
}

async fn travel(State(service): Shared, Json(req): Json<TravelRequest>) -> ApiResult {
    let report = service.time_travel(req.position)?;
    Ok(Json(json!({
        "success": true,
        "position": report.position,
        "current_state": report.current_state,
    })))
}

/// HTTP server bound to one address
pub struct ApiServer {
    bind: String,
    service: Arc<MysticService>,
}

impl ApiServer {
    /// Create a server for `service` listening on `bind`
    #[must_use]
    pub fn new(bind: impl Into<String>, service: Arc<MysticService>) -> Self {
        Self {
            bind: bind.into(),
            service,
        }
    }

    /// Bind address
    #[must_use]
    pub fn bind(&self) -> &str {
        &self.bind
    }

    /// Serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind.as_str()).await?;
        tracing::info!(addr = %listener.local_addr()?, "mystic server listening");
        axum::serve(listener, router(self.service))
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
