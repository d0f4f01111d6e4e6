//! `Report`, `ReportSection`, and `Citation` — the synthesizer's output.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub claim: String,
    pub supporting_evidence_ids: Vec<Uuid>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: Uuid,
    pub pillar_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub key_findings: Vec<Finding>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub recommendations: Vec<String>,
    pub order: usize,
    /// Set when the analyzer failed after retries and this section is a
    /// placeholder (spec §4.6 "Failure semantics").
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: Uuid,
    pub report_id: Uuid,
    pub section_id: Uuid,
    /// Monotonic per-report citation number, starting at 1.
    pub number: u32,
    pub claim_text: String,
    pub evidence_id: Uuid,
    pub quote: String,
    pub context: String,
    pub confidence: f64,
    /// Set when the anchor matcher (spec §4.6 step 5) could not place this
    /// citation inline and it was attached to the section footer instead.
    pub weak_anchor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub executive_summary: String,
    pub investment_score: f64,
    pub sections: Vec<ReportSection>,
    pub aggregate_quality_score: f64,
    pub evidence_count: usize,
    pub generator_model: String,
}

impl Report {
    /// Spec §8.5 score-consistency property:
    /// `|overall − 10 * Σ(pillar.weight * section.score/10)| ≤ 1.0`
    pub fn is_score_consistent(&self, pillar_weights: &[(Uuid, f64)]) -> bool {
        let weighted: f64 = self
            .sections
            .iter()
            .filter_map(|s| {
                let pid = s.pillar_id?;
                let weight = pillar_weights.iter().find(|(id, _)| *id == pid)?.1;
                Some(weight * (s.score / 10.0))
            })
            .sum::<f64>()
            * 10.0;
        (self.investment_score - weighted).abs() <= 1.0
    }
}
