//! Canonical pipeline stages and their per-scan results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The ten canonical stages, in the fixed order the Orchestrator enforces
/// (spec §4.4). `StageResult`s for a scan must form a prefix of this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InitialEvidence,
    DeepWebCrawl,
    TechnologyAnalysis,
    BusinessIntelligence,
    SecurityAssessment,
    CompetitiveAnalysis,
    FinancialIndicators,
    ThesisSpecificAnalysis,
    EvidenceProcessing,
    ReportGeneration,
}

impl Stage {
    pub const CANONICAL_ORDER: [Stage; 10] = [
        Stage::InitialEvidence,
        Stage::DeepWebCrawl,
        Stage::TechnologyAnalysis,
        Stage::BusinessIntelligence,
        Stage::SecurityAssessment,
        Stage::CompetitiveAnalysis,
        Stage::FinancialIndicators,
        Stage::ThesisSpecificAnalysis,
        Stage::EvidenceProcessing,
        Stage::ReportGeneration,
    ];

    pub fn index(self) -> usize {
        Self::CANONICAL_ORDER
            .iter()
            .position(|s| *s == self)
            .expect("Stage is always one of CANONICAL_ORDER")
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::InitialEvidence => "initial_evidence",
            Stage::DeepWebCrawl => "deep_web_crawl",
            Stage::TechnologyAnalysis => "technology_analysis",
            Stage::BusinessIntelligence => "business_intelligence",
            Stage::SecurityAssessment => "security_assessment",
            Stage::CompetitiveAnalysis => "competitive_analysis",
            Stage::FinancialIndicators => "financial_indicators",
            Stage::ThesisSpecificAnalysis => "thesis_specific_analysis",
            Stage::EvidenceProcessing => "evidence_processing",
            Stage::ReportGeneration => "report_generation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Partial,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    pub retries: u32,
    pub duration_ms: u64,
    pub evidence_count: usize,
    pub error: Option<String>,
}

impl StageResult {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_has_ten_stages_in_spec_sequence() {
        assert_eq!(Stage::CANONICAL_ORDER.len(), 10);
        assert_eq!(Stage::CANONICAL_ORDER[0], Stage::InitialEvidence);
        assert_eq!(Stage::CANONICAL_ORDER[9], Stage::ReportGeneration);
    }

    #[test]
    fn index_matches_position_in_canonical_order() {
        assert_eq!(Stage::InitialEvidence.index(), 0);
        assert_eq!(Stage::EvidenceProcessing.index(), 8);
    }
}
