//! Maps each canonical stage to the capabilities it exercises and the
//! conditions under which it runs at all (spec §4.4).

use crate::collectors::CollectorRegistry;
use crate::config::Tunables;
use crate::domain::{AnalysisDepth, Capability, Stage, StageResult, StageStatus, Thesis};
use crate::resilience::{HealthBand, ResilienceRegistry};

/// Capabilities a stage schedules collector jobs for. Stages 9 and 10 run no
/// collectors: evidence processing is deterministic post-processing and
/// report generation invokes the Synthesizer instead.
pub fn capabilities_for(stage: Stage) -> &'static [Capability] {
    match stage {
        Stage::InitialEvidence => &[Capability::Web, Capability::Tech],
        Stage::DeepWebCrawl => &[Capability::Web, Capability::DeepResearch],
        Stage::TechnologyAnalysis => &[Capability::Tech, Capability::Performance],
        Stage::BusinessIntelligence => &[Capability::Market],
        Stage::SecurityAssessment => &[Capability::Security, Capability::Tls, Capability::Vulnerability],
        Stage::CompetitiveAnalysis => &[Capability::Market, Capability::DeepResearch],
        Stage::FinancialIndicators => &[Capability::Financial],
        Stage::ThesisSpecificAnalysis => &[Capability::DeepResearch, Capability::Team],
        Stage::EvidenceProcessing => &[],
        Stage::ReportGeneration => &[],
    }
}

/// Maps a capability to the named queue kind it is scheduled on (spec §4.2's
/// example kind names: `search`, `web-scrape`, `tech-detect`,
/// `security-scan`, `tls-scan`, `vuln-scan`).
pub fn queue_kind_for(capability: Capability) -> &'static str {
    match capability {
        Capability::Web | Capability::DeepResearch => "web-scrape",
        Capability::Tech | Capability::Performance => "tech-detect",
        Capability::Security => "security-scan",
        Capability::Tls => "tls-scan",
        Capability::Vulnerability => "vuln-scan",
        Capability::Market | Capability::Financial | Capability::Team => "search",
    }
}

/// Whether `stage` should be scheduled at all, given prior stage results,
/// analysis depth, and thesis presence.
///
/// Exhaustive depth forces the deep crawl regardless of the evidence
/// threshold (SPEC_FULL.md §9, resolving spec.md's open question on depth
/// interaction).
pub fn should_run(
    stage: Stage,
    depth: AnalysisDepth,
    thesis: Option<&Thesis>,
    prior: &[StageResult],
    tunables: &Tunables,
) -> bool {
    match stage {
        Stage::DeepWebCrawl => {
            if matches!(depth, AnalysisDepth::Exhaustive) {
                return true;
            }
            let initial_count = prior
                .iter()
                .find(|r| r.stage == Stage::InitialEvidence)
                .map(|r| r.evidence_count)
                .unwrap_or(0);
            initial_count >= tunables.min_evidence_for_deep_crawl
        }
        Stage::ThesisSpecificAnalysis => thesis.is_some(),
        _ => true,
    }
}

/// Stages the Orchestrator can decline to run when the collectors behind
/// them are unhealthy. The three non-optional stages always run: the first
/// stage because nothing has failed yet, and the last two because they run
/// no collectors at all.
fn is_optional(stage: Stage) -> bool {
    !matches!(stage, Stage::InitialEvidence | Stage::EvidenceProcessing | Stage::ReportGeneration)
}

/// Whether every collector registered against any of `stage`'s capabilities
/// is in the `Critical` health band (spec §5 "The Orchestrator reads health
/// before starting optional stages and may skip them when critical").
pub fn stage_health_is_critical(stage: Stage, registry: &CollectorRegistry, resilience: &ResilienceRegistry) -> bool {
    if !is_optional(stage) {
        return false;
    }
    let capabilities = capabilities_for(stage);
    if capabilities.is_empty() {
        return false;
    }
    capabilities.iter().all(|capability| {
        let candidates = registry.by_capability(*capability);
        !candidates.is_empty() && candidates.iter().all(|c| resilience.health.band(c.name()) == HealthBand::Critical)
    })
}

pub fn skipped_result(stage: Stage) -> StageResult {
    StageResult { stage, status: StageStatus::Skipped, retries: 0, duration_ms: 0, evidence_count: 0, error: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn result(stage: Stage, count: usize) -> StageResult {
        StageResult { stage, status: StageStatus::Success, retries: 0, duration_ms: 0, evidence_count: count, error: None }
    }

    #[test]
    fn deep_crawl_gated_on_initial_evidence_count() {
        let tunables = Tunables::default();
        let prior = vec![result(Stage::InitialEvidence, 4)];
        assert!(!should_run(Stage::DeepWebCrawl, AnalysisDepth::Shallow, None, &prior, &tunables));

        let prior = vec![result(Stage::InitialEvidence, 40)];
        assert!(should_run(Stage::DeepWebCrawl, AnalysisDepth::Shallow, None, &prior, &tunables));
    }

    #[test]
    fn exhaustive_depth_forces_deep_crawl() {
        let tunables = Tunables::default();
        let prior = vec![result(Stage::InitialEvidence, 0)];
        assert!(should_run(Stage::DeepWebCrawl, AnalysisDepth::Exhaustive, None, &prior, &tunables));
    }

    #[test]
    fn thesis_specific_stage_requires_a_thesis() {
        let tunables = Tunables::default();
        assert!(!should_run(Stage::ThesisSpecificAnalysis, AnalysisDepth::Deep, None, &[], &tunables));
    }

    fn registry_with_heuristic() -> CollectorRegistry {
        let registry = CollectorRegistry::new();
        registry.register(Arc::new(crate::collectors::heuristic::HeuristicFallbackCollector::new()), 0);
        registry
    }

    #[test]
    fn optional_stage_is_skipped_when_every_backing_collector_is_critical() {
        let registry = registry_with_heuristic();
        let resilience = ResilienceRegistry::new(Tunables::default());
        for _ in 0..10 {
            resilience.health.record_failure("heuristic-fallback");
        }
        assert!(stage_health_is_critical(Stage::BusinessIntelligence, &registry, &resilience));
    }

    #[test]
    fn optional_stage_runs_while_its_collectors_are_healthy() {
        let registry = registry_with_heuristic();
        let resilience = ResilienceRegistry::new(Tunables::default());
        assert!(!stage_health_is_critical(Stage::BusinessIntelligence, &registry, &resilience));
    }

    #[test]
    fn non_optional_stages_never_health_gate() {
        let registry = registry_with_heuristic();
        let resilience = ResilienceRegistry::new(Tunables::default());
        for _ in 0..10 {
            resilience.health.record_failure("heuristic-fallback");
        }
        assert!(!stage_health_is_critical(Stage::InitialEvidence, &registry, &resilience));
        assert!(!stage_health_is_critical(Stage::EvidenceProcessing, &registry, &resilience));
        assert!(!stage_health_is_critical(Stage::ReportGeneration, &registry, &resilience));
    }
}
