//! Heuristic fallback collector (spec §4.3): the terminus of every fallback
//! chain. Cannot itself fail with a retriable error — it derives minimal
//! evidence from the input alone, flagged `fallback=true, confidence<=0.5`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Capability, Evidence, EvidenceContent, EvidenceMetadata, EvidenceType, SourceDescriptor,
};

use super::{CollectInput, CollectOutput, Collector};

pub struct HeuristicFallbackCollector;

impl HeuristicFallbackCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeuristicFallbackCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for HeuristicFallbackCollector {
    fn name(&self) -> &str {
        "heuristic-fallback"
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::Web,
            Capability::Tech,
            Capability::Security,
            Capability::Market,
            Capability::Financial,
            Capability::Team,
            Capability::Vulnerability,
            Capability::Tls,
            Capability::Performance,
            Capability::DeepResearch,
        ]
    }

    fn cost(&self) -> u32 {
        0
    }

    fn suggested_timeout(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn max_concurrency(&self) -> usize {
        usize::MAX
    }

    async fn collect(&self, input: &CollectInput) -> CollectOutput {
        let summary = format!(
            "No collector succeeded for {}; derived from company name and website only.",
            input.company_name
        );
        let mut metadata = EvidenceMetadata { confidence: 0.3, relevance: 0.3, ..EvidenceMetadata::default() };
        metadata.fallback = true;
        metadata.extraction_trail.push("heuristic-fallback".into());

        let evidence = Evidence::new(
            input.scan_id,
            "general",
            EvidenceType::Other("heuristic".into()),
            SourceDescriptor {
                kind: "heuristic".into(),
                url_or_query: input.company_website.clone(),
                timestamp: Utc::now(),
            },
            EvidenceContent { raw: String::new(), processed_summary: summary, title: None },
            metadata,
        );

        CollectOutput::ok(vec![evidence])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn produces_low_confidence_flagged_evidence() {
        let collector = HeuristicFallbackCollector::new();
        let input = CollectInput {
            scan_id: Uuid::new_v4(),
            company_name: "Acme".into(),
            company_website: "https://acme.test".into(),
            options: serde_json::json!({}),
        };
        let output = collector.collect(&input).await;
        assert_eq!(output.evidence.len(), 1);
        assert!(output.evidence[0].metadata.fallback);
        assert!(output.evidence[0].metadata.confidence <= 0.5);
    }
}
