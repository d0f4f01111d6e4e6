//! `GET /collectors`, `POST /collectors/:name/enable` (spec §6 admin surface).
//!
//! Registration itself happens once at startup (`main.rs`); this surface
//! only toggles the `enabled` flag the Registry already exposes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::domain::Capability;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct CollectorSummaryResponse {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
    pub priority: i32,
}

pub async fn list_collectors(State(state): State<AppState>) -> Json<Vec<CollectorSummaryResponse>> {
    let summaries = state
        .registry
        .list()
        .into_iter()
        .map(|s| CollectorSummaryResponse { name: s.name, capabilities: s.capabilities, enabled: s.enabled, priority: s.priority })
        .collect();
    Json(summaries)
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn set_collector_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> Result<StatusCode, ApiError> {
    if state.registry.set_enabled(&name, request.enabled) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("collector {name} not registered")))
    }
}
