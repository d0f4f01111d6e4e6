//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, and latency.
//! Requests under `/scans/:id...` carry the scan id in the span so a
//! scan's HTTP activity can be grepped out of the logs the same way its
//! collector and orchestrator events already are (see `orchestrator/mod.rs`).

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Span};
use uuid::Uuid;

/// Pulls the scan id out of a `/scans/:id...` path, if present.
fn scan_id_from_path(path: &str) -> Option<Uuid> {
    let mut segments = path.trim_start_matches('/').split('/');
    if segments.next()? != "scans" {
        return None;
    }
    segments.next()?.parse().ok()
}

/// Logs at INFO for successful requests, WARN for 5xx. Skips `/health` to
/// keep the log free of liveness-probe noise.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let scan_id = scan_id_from_path(&path);
    let start = Instant::now();

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        scan_id = tracing::field::Empty,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    if let Some(scan_id) = scan_id {
        span.record("scan_id", tracing::field::display(scan_id));
    }
    let _guard = span.enter();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();
    Span::current().record("status", status.as_u16());
    Span::current().record("latency_ms", latency.as_millis() as u64);

    if status.as_u16() >= 500 {
        warn!(method = %method, path = %path, scan_id = ?scan_id, status = status.as_u16(), latency_ms = latency.as_millis(), "request failed");
    } else {
        info!(method = %method, path = %path, scan_id = ?scan_id, status = status.as_u16(), latency_ms = latency.as_millis(), "request completed");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_scan_id_from_scoped_paths() {
        let id = Uuid::new_v4();
        assert_eq!(scan_id_from_path(&format!("/scans/{id}")), Some(id));
        assert_eq!(scan_id_from_path(&format!("/scans/{id}/events")), Some(id));
        assert_eq!(scan_id_from_path(&format!("/scans/{id}/cancel")), Some(id));
    }

    #[test]
    fn returns_none_for_unrelated_paths() {
        assert_eq!(scan_id_from_path("/health"), None);
        assert_eq!(scan_id_from_path("/collectors"), None);
        assert_eq!(scan_id_from_path("/scans/not-a-uuid"), None);
    }
}
