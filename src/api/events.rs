//! `GET /scans/:id/events` (spec §4.7, §6): an SSE stream of a scan's
//! `ProgressEvent`s, replaying anything since `?since=` before switching to
//! live broadcast.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
}

pub async fn scan_events(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let hub = state.orchestrator.progress();
    let since = params.since.unwrap_or(0);

    let backlog = hub.replay_since(scan_id, since);
    let live = BroadcastStream::new(hub.subscribe(scan_id)).filter_map(|item| async move { item.ok() });

    let events = futures_util::stream::iter(backlog).chain(live).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event(progress_event_label(&event.event)).data(data))
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn progress_event_label(kind: &crate::domain::ProgressEventKind) -> &'static str {
    use crate::domain::ProgressEventKind::*;
    match kind {
        Start => "start",
        PhaseStart { .. } => "phase_start",
        PhaseComplete { .. } => "phase_complete",
        CollectorStart { .. } => "collector_start",
        CollectorSuccess { .. } => "collector_success",
        CollectorError { .. } => "collector_error",
        EvidenceCollected { .. } => "evidence_collected",
        AnalysisStart => "analysis_start",
        CategoryAnalyzed { .. } => "category_analyzed",
        SynthesisStart => "synthesis_start",
        ReportPersisted { .. } => "report_persisted",
        Complete { .. } => "complete",
        Error { .. } => "error",
    }
}
