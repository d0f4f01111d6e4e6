//! `ProgressEvent` — the append-only per-scan stream delivered to subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_kind", rename_all = "snake_case")]
pub enum ProgressEventKind {
    Start,
    PhaseStart { stage: String },
    PhaseComplete { stage: String },
    CollectorStart { collector: String },
    CollectorSuccess { collector: String, evidence_count: usize },
    CollectorError { collector: String, kind: String, message: String },
    EvidenceCollected { count: usize },
    AnalysisStart,
    CategoryAnalyzed { pillar: String, score: f64 },
    SynthesisStart,
    ReportPersisted { report_id: Uuid },
    Complete { status: String },
    Error { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub scan_id: Uuid,
    /// Monotonically increasing per scan, starting at 1.
    pub sequence: u64,
    pub event: ProgressEventKind,
    #[serde(default)]
    pub payload: Option<Value>,
}
