//! `GET /reports/:id` (spec §6): a report plus its bound citations.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Citation, Report};

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: Report,
    pub citations: Vec<Citation>,
}

pub async fn get_report(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ReportResponse>, ApiError> {
    let report = state
        .store
        .get_report(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("report {id} not found")))?;
    let citations = state.store.get_citations_for_report(report.id).await.map_err(ApiError::internal)?;
    Ok(Json(ReportResponse { report, citations }))
}

pub async fn get_report_for_scan(State(state): State<AppState>, Path(scan_id): Path<Uuid>) -> Result<Json<ReportResponse>, ApiError> {
    let report = state
        .store
        .get_report_for_scan(scan_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("no report for scan {scan_id}")))?;
    let citations = state.store.get_citations_for_report(report.id).await.map_err(ApiError::internal)?;
    Ok(Json(ReportResponse { report, citations }))
}
