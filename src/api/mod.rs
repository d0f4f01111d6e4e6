//! HTTP surface (spec §6): scan intake, progress streaming, report
//! retrieval, and collector administration.

pub mod collectors;
pub mod error;
pub mod events;
pub mod health;
pub mod reports;
pub mod scans;
pub mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full router. Middleware order mirrors the teacher's
/// `main.rs`: CORS first, then request logging, so logged status codes
/// reflect whatever CORS preflight handling already did.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/scans", post(scans::create_scan))
        .route("/scans/:id", get(scans::get_scan))
        .route("/scans/:id/cancel", post(scans::cancel_scan))
        .route("/scans/:id/events", get(events::scan_events))
        .route("/scans/:id/report", get(reports::get_report_for_scan))
        .route("/reports/:id", get(reports::get_report))
        .route("/collectors", get(collectors::list_collectors))
        .route("/collectors/:name/enable", post(collectors::set_collector_enabled))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(crate::middleware::logging::request_logging))
        .with_state(state)
}
