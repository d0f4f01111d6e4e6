//! `ScanRequest` and supporting types — the unit of work the orchestrator drives
//! from intake to a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Shallow,
    Deep,
    Exhaustive,
}

/// Terminal and in-flight statuses a `ScanRequest` can hold.
///
/// A scan reaches exactly one of the three terminal variants; `Running` and
/// `Canceling` are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Canceling,
    AwaitingReview,
    CompletedWithErrors,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanStatus::AwaitingReview | ScanStatus::CompletedWithErrors | ScanStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub website: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub id: Uuid,
    pub company: Company,
    pub investor_profile: Option<String>,
    pub analysis_depth: AnalysisDepth,
    pub thesis_id: Option<Uuid>,
    pub status: ScanStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanRequest {
    pub fn new(company: Company, analysis_depth: AnalysisDepth, thesis_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company,
            investor_profile: None,
            analysis_depth,
            thesis_id,
            status: ScanStatus::Pending,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transitions to a new status, refusing to move away from a terminal one.
    ///
    /// Spec invariant: a scan reaches a terminal status exactly once.
    pub fn transition(&mut self, status: ScanStatus, message: Option<String>) -> anyhow::Result<()> {
        if self.status.is_terminal() {
            anyhow::bail!(
                "scan {} already terminal ({:?}); refusing transition to {:?}",
                self.id,
                self.status,
                status
            );
        }
        self.status = status;
        self.status_message = message;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScanRequest {
        ScanRequest::new(
            Company {
                name: "Acme".into(),
                website: "https://acme.test".into(),
            },
            AnalysisDepth::Shallow,
            None,
        )
    }

    #[test]
    fn new_scan_starts_pending() {
        assert_eq!(sample().status, ScanStatus::Pending);
    }

    #[test]
    fn terminal_transition_is_sticky() {
        let mut scan = sample();
        scan.transition(ScanStatus::Failed, Some("deadline exceeded".into()))
            .unwrap();
        assert!(scan
            .transition(ScanStatus::AwaitingReview, None)
            .is_err());
    }
}
