//! Request correlation

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use mystic_core::CorrelationId;
use tracing::Instrument;

/// Header carrying the correlation id in both directions
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Attach a correlation id to the request and its tracing span.
///
/// An incoming `x-correlation-id` that parses as a UUID is reused; anything
/// else gets a fresh id. The id is stored in the request extensions and
/// echoed on the response.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<CorrelationId>().ok())
        .unwrap_or_default();
    request.extensions_mut().insert(id);

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
