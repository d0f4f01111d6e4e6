//! `POST /scans`, `GET /scans/:id`, `POST /scans/:id/cancel` (spec §6).
//!
//! A scan runs to completion on a spawned task; the handler returns as soon
//! as the request is accepted and persisted, matching the teacher's habit of
//! kicking off long-running work with `tokio::spawn` rather than blocking a
//! request on it (`main.rs`'s background pollers).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AnalysisDepth, Company, Pillar, ScanRequest, ScanStatus, Thesis};
use crate::orchestrator::CancellationToken;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PillarInput {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThesisInput {
    pub statement: String,
    pub pillars: Vec<PillarInput>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub target_market_hints: Vec<String>,
}

impl ThesisInput {
    fn into_thesis(self) -> Thesis {
        let mut thesis = Thesis {
            id: Uuid::new_v4(),
            statement: self.statement,
            pillars: self
                .pillars
                .into_iter()
                .map(|p| Pillar { id: Uuid::new_v4(), name: p.name, weight: p.weight, questions: p.questions })
                .collect(),
            success_criteria: self.success_criteria,
            target_market_hints: self.target_market_hints,
        };
        if !thesis.weights_are_normalized() {
            thesis.renormalize();
        }
        thesis
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    pub company_name: String,
    pub company_website: String,
    #[serde(default)]
    pub investor_profile: Option<String>,
    #[serde(default)]
    pub analysis_depth: Option<AnalysisDepth>,
    #[serde(default)]
    pub thesis: Option<ThesisInput>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub id: Uuid,
    pub company_name: String,
    pub company_website: String,
    pub status: ScanStatus,
    pub status_message: Option<String>,
    pub analysis_depth: AnalysisDepth,
}

impl From<ScanRequest> for ScanResponse {
    fn from(scan: ScanRequest) -> Self {
        Self {
            id: scan.id,
            company_name: scan.company.name,
            company_website: scan.company.website,
            status: scan.status,
            status_message: scan.status_message,
            analysis_depth: scan.analysis_depth,
        }
    }
}

pub async fn create_scan(
    State(state): State<AppState>,
    Json(request): Json<CreateScanRequest>,
) -> Result<(StatusCode, Json<ScanResponse>), ApiError> {
    if request.company_name.trim().is_empty() || request.company_website.trim().is_empty() {
        return Err(ApiError::bad_request("company_name and company_website are required"));
    }

    let thesis = request.thesis.map(ThesisInput::into_thesis);
    let scan = ScanRequest::new(
        Company { name: request.company_name, website: request.company_website },
        request.analysis_depth.unwrap_or(AnalysisDepth::Shallow),
        thesis.as_ref().map(|t| t.id),
    );
    let mut scan_with_profile = scan.clone();
    scan_with_profile.investor_profile = request.investor_profile;

    state.store.upsert_scan(&scan_with_profile).await.map_err(ApiError::internal)?;

    let cancel = CancellationToken::new();
    state.cancellations.lock().insert(scan_with_profile.id, cancel.clone());

    let orchestrator = state.orchestrator.clone();
    let cancellations = state.cancellations.clone();
    let scan_id = scan_with_profile.id;
    let run_scan = scan_with_profile.clone();

    tokio::spawn(async move {
        let outcome = orchestrator.run(run_scan, thesis, cancel).await;
        cancellations.lock().remove(&scan_id);
        if let Err(err) = outcome {
            tracing::error!(scan_id = %scan_id, error = %err, "scan run failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ScanResponse::from(scan_with_profile))))
}

pub async fn get_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ScanResponse>, ApiError> {
    let scan = state
        .store
        .get_scan(id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("scan {id} not found")))?;
    Ok(Json(ScanResponse::from(scan)))
}

pub async fn cancel_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let cancellations = state.cancellations.lock();
    match cancellations.get(&id) {
        Some(token) => {
            token.cancel();
            Ok(StatusCode::ACCEPTED)
        }
        None => Err(ApiError::not_found(format!("scan {id} is not running"))),
    }
}
