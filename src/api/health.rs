//! `GET /health`: liveness plus a collector-count sanity check.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub registered_collectors: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", registered_collectors: state.registry.len() })
}
