//! `CollectorJob` — the unit the Queue Subsystem schedules and the Resilience
//! Layer wraps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLettered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorJob {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub collector_name: String,
    /// Queue kind this job is routed through (e.g. "web-scrape", "tls-scan").
    pub kind: String,
    pub payload: Value,
    pub priority: u8,
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
    pub visibility_deadline: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

impl CollectorJob {
    pub fn new(scan_id: Uuid, collector_name: impl Into<String>, kind: impl Into<String>, payload: Value, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id,
            collector_name: collector_name.into(),
            kind: kind.into(),
            payload,
            priority: priority.min(9),
            attempt: 0,
            scheduled_at: Utc::now(),
            visibility_deadline: None,
            status: JobStatus::Pending,
        }
    }
}
