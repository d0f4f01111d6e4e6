//! Report Synthesizer (spec §4.6): partitions evidence by pillar, analyzes
//! each pillar independently, binds citations, and reconciles section scores
//! into one investment score.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::config::Tunables;
use crate::domain::{Citation, Evidence, Report, ReportSection, ScanRequest, Thesis};
use crate::resilience::retry_with_backoff;
use crate::clock::Clock;

use super::analyzer::{Analyzer, SectionAnalysisRequest};
use super::citation::bind_citations;

const MAX_EVIDENCE_PER_SECTION: usize = 30;
const SECTION_CONCURRENCY: usize = 4;

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn synthesize(
        &self,
        scan: &ScanRequest,
        thesis: Option<&Thesis>,
        evidence: &[Evidence],
    ) -> anyhow::Result<(Report, Vec<Citation>)>;
}

pub struct Synthesizer {
    analyzer: Arc<dyn Analyzer>,
    clock: Arc<dyn Clock>,
    tunables: Tunables,
    model_label: String,
}

impl Synthesizer {
    pub fn new(analyzer: Arc<dyn Analyzer>, clock: Arc<dyn Clock>, tunables: Tunables, model_label: impl Into<String>) -> Self {
        Self { analyzer, clock, tunables, model_label: model_label.into() }
    }

    /// Groups evidence by pillar tag, taking the thesis's pillar list as the
    /// canonical partition when a thesis is present and falling back to
    /// whatever tags evidence carries otherwise (spec §4.6 step 1).
    fn partition<'a>(thesis: Option<&'a Thesis>, evidence: &'a [Evidence]) -> Vec<(Option<Uuid>, String, Vec<&'a Evidence>)> {
        if let Some(thesis) = thesis {
            thesis
                .pillars
                .iter()
                .map(|pillar| {
                    let mut items: Vec<&Evidence> = evidence.iter().filter(|e| e.pillar_tag == pillar.name).collect();
                    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                    items.truncate(MAX_EVIDENCE_PER_SECTION);
                    (Some(pillar.id), pillar.name.clone(), items)
                })
                .collect()
        } else {
            let mut by_tag: HashMap<String, Vec<&Evidence>> = HashMap::new();
            for item in evidence {
                by_tag.entry(item.pillar_tag.clone()).or_default().push(item);
            }
            by_tag
                .into_iter()
                .map(|(tag, mut items)| {
                    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                    items.truncate(MAX_EVIDENCE_PER_SECTION);
                    (None, tag, items)
                })
                .collect()
        }
    }

    fn pillar_weight(thesis: Option<&Thesis>, pillar_id: Option<Uuid>) -> f64 {
        match (thesis, pillar_id) {
            (Some(thesis), Some(id)) => thesis.pillar(id).map(|p| p.weight).unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

#[async_trait]
impl ReportGenerator for Synthesizer {
    async fn synthesize(
        &self,
        scan: &ScanRequest,
        thesis: Option<&Thesis>,
        evidence: &[Evidence],
    ) -> anyhow::Result<(Report, Vec<Citation>)> {
        let partitions = Self::partition(thesis, evidence);
        let company_name = scan.company.name.clone();

        let section_futures: Vec<_> = partitions.into_iter().enumerate().map(|(order, (pillar_id, name, items))| {
            let analyzer = self.analyzer.clone();
            let tunables = self.tunables.clone();
            let clock = self.clock.clone();
            let company_name = company_name.clone();
            let owned_items: Vec<Evidence> = items.into_iter().cloned().collect();

            async move {
                let pillar_questions: Vec<String> = thesis
                    .and_then(|t| pillar_id.and_then(|id| t.pillar(id)))
                    .map(|p| p.questions.clone())
                    .unwrap_or_default();

                let request = SectionAnalysisRequest {
                    company_name: &company_name,
                    pillar_name: &name,
                    pillar_questions: &pillar_questions,
                    evidence: &owned_items,
                };

                let result = retry_with_backoff("synthesizer_analyze_section", &tunables, clock.clone(), || {
                    let analyzer = analyzer.clone();
                    let request = request;
                    async move { analyzer.analyze_section(&request).await }
                })
                .await;

                match result {
                    Ok(analysis) => {
                        let mut content = analysis.summary.clone();
                        content.push_str("\n\n");
                        content.push_str(&analysis.findings.iter().map(|f| f.claim.clone()).collect::<Vec<_>>().join(" "));

                        let section = ReportSection {
                            id: Uuid::new_v4(),
                            pillar_id,
                            title: name,
                            content,
                            score: analysis.score,
                            key_findings: analysis
                                .findings
                                .iter()
                                .map(|f| crate::domain::Finding {
                                    claim: f.claim.clone(),
                                    supporting_evidence_ids: f.supporting_evidence_ids.clone(),
                                    confidence: f.confidence,
                                })
                                .collect(),
                            risks: analysis.risks,
                            opportunities: analysis.opportunities,
                            recommendations: analysis.recommendations,
                            order,
                            degraded: false,
                        };
                        section
                    }
                    Err(err) => {
                        warn!(pillar = %name, error = %err, "section analysis failed after retries, degrading section");
                        let section = ReportSection {
                            id: Uuid::new_v4(),
                            pillar_id,
                            title: name.clone(),
                            content: format!("Analysis for {name} could not be completed: {err}"),
                            score: 0.0,
                            key_findings: Vec::new(),
                            risks: vec!["This section reflects a failed analysis and should be treated as incomplete.".into()],
                            opportunities: Vec::new(),
                            recommendations: Vec::new(),
                            order,
                            degraded: true,
                        };
                        section
                    }
                }
            }
        }).collect();

        let mut sections: Vec<ReportSection> = stream::iter(section_futures)
            .buffer_unordered(SECTION_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        // Citation binding needs the analyzed findings alongside each
        // section's content and evidence, so re-run the association pass
        // here rather than threading it through the stream above.
        let report_id = Uuid::new_v4();
        let mut next_number = 1u32;
        let mut all_citations = Vec::new();
        let evidence_by_id: HashMap<Uuid, &Evidence> = evidence.iter().map(|e| (e.id, e)).collect();

        for section in &mut sections {
            let findings: Vec<super::analyzer::AnalyzedFinding> = section
                .key_findings
                .iter()
                .map(|f| super::analyzer::AnalyzedFinding {
                    claim: f.claim.clone(),
                    supporting_evidence_ids: f.supporting_evidence_ids.clone(),
                    confidence: f.confidence,
                })
                .collect();

            let (content_with_citations, citations) = bind_citations(
                report_id,
                section.id,
                &section.content,
                &findings,
                &evidence_by_id,
                self.tunables.citation_near_proximity_chars,
                &mut next_number,
            );
            section.content = content_with_citations;
            all_citations.extend(citations);
        }

        let investment_score = if thesis.is_some() {
            sections.iter().map(|s| Self::pillar_weight(thesis, s.pillar_id) * s.score).sum::<f64>()
        } else if sections.is_empty() {
            0.0
        } else {
            sections.iter().map(|s| s.score).sum::<f64>() / sections.len() as f64
        };

        let aggregate_quality_score = if sections.is_empty() {
            0.0
        } else {
            sections.iter().map(|s| s.score).sum::<f64>() / sections.len() as f64 / 10.0
        };

        let executive_summary = if sections.iter().any(|s| s.degraded) {
            format!(
                "Automated due-diligence summary for {} ({} of {} sections fully analyzed).",
                company_name,
                sections.iter().filter(|s| !s.degraded).count(),
                sections.len()
            )
        } else {
            format!("Automated due-diligence summary for {company_name} across {} sections.", sections.len())
        };

        let report = Report {
            id: report_id,
            scan_id: scan.id,
            executive_summary,
            investment_score,
            sections,
            aggregate_quality_score,
            evidence_count: evidence.len(),
            generator_model: self.model_label.clone(),
        };

        Ok((report, all_citations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::{AnalysisDepth, Company, EvidenceContent, EvidenceMetadata, EvidenceType, Pillar, SourceDescriptor};
    use crate::synthesizer::analyzer::DeterministicAnalyzer;

    fn scan() -> ScanRequest {
        ScanRequest::new(Company { name: "Acme".into(), website: "https://acme.test".into() }, AnalysisDepth::Shallow, None)
    }

    fn sample_evidence(pillar: &str) -> Evidence {
        let mut metadata = EvidenceMetadata::default();
        metadata.confidence = 0.8;
        Evidence::new(
            Uuid::new_v4(),
            pillar,
            EvidenceType::TechStack,
            SourceDescriptor { kind: "web".into(), url_or_query: "https://acme.test".into(), timestamp: chrono::Utc::now() },
            EvidenceContent { raw: String::new(), processed_summary: "Acme runs on Rust and Postgres.".into(), title: None },
            metadata,
        )
    }

    #[tokio::test]
    async fn synthesizes_one_section_per_thesis_pillar() {
        let thesis = Thesis {
            id: Uuid::new_v4(),
            statement: "test".into(),
            pillars: vec![Pillar { id: Uuid::new_v4(), name: "technology".into(), weight: 1.0, questions: vec![] }],
            success_criteria: vec![],
            target_market_hints: vec![],
        };
        let synthesizer = Synthesizer::new(Arc::new(DeterministicAnalyzer), Arc::new(SystemClock), Tunables::default(), "offline");
        let evidence = vec![sample_evidence("technology")];
        let (report, _citations) = synthesizer.synthesize(&scan(), Some(&thesis), &evidence).await.unwrap();
        assert_eq!(report.sections.len(), 1);
        assert!(report.investment_score > 0.0);
    }

    #[tokio::test]
    async fn empty_evidence_still_produces_a_report() {
        let synthesizer = Synthesizer::new(Arc::new(DeterministicAnalyzer), Arc::new(SystemClock), Tunables::default(), "offline");
        let (report, citations) = synthesizer.synthesize(&scan(), None, &[]).await.unwrap();
        assert!(report.sections.is_empty());
        assert!(citations.is_empty());
        assert_eq!(report.investment_score, 0.0);
    }
}
