//! Pipeline Orchestrator (spec §4.4): drives a `ScanRequest` through the ten
//! canonical stages, owning the process-wide Queue Registry, Resilience
//! Registry, and Progress Hub that every stage shares.

pub mod cancel;
pub mod dispatch;
pub mod stage_plan;

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

pub use cancel::CancellationToken;

use crate::clock::Clock;
use crate::collectors::{CollectInput, CollectorRegistry};
use crate::config::Tunables;
use crate::domain::{ProgressEventKind, ScanRequest, ScanStatus, Stage, StageResult, StageStatus, Thesis};
use crate::evidence_pool::EvidencePool;
use crate::progress::ProgressHub;
use crate::queue::QueueRegistry;
use crate::resilience::ResilienceRegistry;
use crate::store::Store;
use crate::synthesizer::ReportGenerator;

use stage_plan::{capabilities_for, should_run, skipped_result, stage_health_is_critical};

/// Determines a scan's terminal status from what the run actually produced
/// (spec §4.4 "terminal status mapping"; SPEC_FULL.md §9 resolves the
/// cancellation case: a report must still be attempted, so cancellation maps
/// to `completed_with_errors` rather than `failed` whenever one exists).
fn terminal_status(report_exists: bool, any_stage_failed: bool, cancelled: bool) -> ScanStatus {
    if !report_exists {
        return ScanStatus::Failed;
    }
    if cancelled || any_stage_failed {
        ScanStatus::CompletedWithErrors
    } else {
        ScanStatus::AwaitingReview
    }
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    registry: Arc<CollectorRegistry>,
    queues: Arc<QueueRegistry>,
    resilience: Arc<ResilienceRegistry>,
    progress: Arc<ProgressHub>,
    synthesizer: Arc<dyn ReportGenerator>,
    clock: Arc<dyn Clock>,
    tunables: Tunables,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<CollectorRegistry>,
        synthesizer: Arc<dyn ReportGenerator>,
        clock: Arc<dyn Clock>,
        tunables: Tunables,
    ) -> Self {
        // Each capability's queue job is claimed immediately after it is
        // enqueued and carries its own in-process fallback chain; a second
        // queue-level attempt would only duplicate work the resilience layer
        // already gave up on, so the queue dead-letters on the first nack.
        let queues = Arc::new(QueueRegistry::new(1, tunables.stage_timeout()));
        let resilience = Arc::new(ResilienceRegistry::new(tunables.clone()));
        let progress = Arc::new(ProgressHub::new());

        Self { store, registry, queues, resilience, progress, synthesizer, clock, tunables }
    }

    pub fn progress(&self) -> Arc<ProgressHub> {
        self.progress.clone()
    }

    /// Runs `scan` to a terminal status, persisting stage results and the
    /// final report/status as it goes so a crash mid-run can resume from the
    /// last completed stage (spec §4.4 "resumability").
    pub async fn run(&self, mut scan: ScanRequest, thesis: Option<Thesis>, cancel: CancellationToken) -> anyhow::Result<ScanRequest> {
        scan.transition(ScanStatus::Running, None)?;
        self.store.upsert_scan(&scan).await?;
        self.progress.publish(scan.id, ProgressEventKind::Start);

        let pool = Arc::new(EvidencePool::new(scan.id, self.store.clone(), self.clock.clone(), self.tunables.clone()));

        let prior_results = self.store.get_stage_results(scan.id).await?;
        let start_index = prior_results.len();
        let mut all_results = prior_results;

        let input = CollectInput {
            scan_id: scan.id,
            company_name: scan.company.name.clone(),
            company_website: scan.company.website.clone(),
            options: json!({}),
        };

        let run_result = tokio::time::timeout(self.tunables.scan_deadline(), async {
            for stage in Stage::CANONICAL_ORDER.iter().skip(start_index) {
                let stage = *stage;

                // Once cancellation is observed, every remaining
                // capability-bearing stage is skipped outright; evidence
                // processing and report generation still run so a
                // best-effort report covers whatever was collected (spec §8
                // scenario E).
                if cancel.is_cancelled() && !matches!(stage, Stage::EvidenceProcessing | Stage::ReportGeneration) {
                    self.progress.publish(scan.id, ProgressEventKind::PhaseStart { stage: stage.name().into() });
                    let result = skipped_result(stage);
                    self.store.append_stage_result(scan.id, &result).await?;
                    all_results.push(result);
                    self.progress.publish(scan.id, ProgressEventKind::PhaseComplete { stage: stage.name().into() });
                    continue;
                }

                let runnable = should_run(stage, scan.analysis_depth, thesis.as_ref(), &all_results, &self.tunables);
                let health_critical = stage_health_is_critical(stage, &self.registry, &self.resilience);
                if health_critical {
                    warn!(scan_id = %scan.id, stage = stage.name(), "skipping stage, every collector backing it is health-critical");
                }
                if !runnable || health_critical {
                    let result = skipped_result(stage);
                    self.store.append_stage_result(scan.id, &result).await?;
                    all_results.push(result);
                    continue;
                }

                self.progress.publish(scan.id, ProgressEventKind::PhaseStart { stage: stage.name().into() });
                let started = Instant::now();

                let result = match stage {
                    Stage::EvidenceProcessing => self.run_evidence_processing(&pool).await,
                    Stage::ReportGeneration => self.run_report_generation(&scan, thesis.as_ref(), stage).await,
                    _ => self.run_capability_stage(&scan, &input, &pool, stage, &cancel).await,
                };

                let result = match result {
                    Ok(result) => result,
                    Err(err) => StageResult {
                        stage,
                        status: StageStatus::Failed,
                        retries: 0,
                        duration_ms: started.elapsed().as_millis() as u64,
                        evidence_count: 0,
                        error: Some(err.to_string()),
                    },
                };

                self.store.append_stage_result(scan.id, &result).await?;
                let failed = matches!(result.status, StageStatus::Failed);
                all_results.push(result);
                self.progress.publish(scan.id, ProgressEventKind::PhaseComplete { stage: stage.name().into() });

                if failed && !self.tunables.continue_on_error {
                    warn!(scan_id = %scan.id, stage = stage.name(), "stage failed, aborting scan (continue_on_error=false)");
                    break;
                }
            }
            Ok::<(), anyhow::Error>(())
        })
        .await;

        let deadline_exceeded = run_result.is_err();
        if deadline_exceeded {
            warn!(scan_id = %scan.id, "scan deadline exceeded");
        } else if let Ok(Err(err)) = run_result {
            warn!(scan_id = %scan.id, error = %err, "scan loop returned an error");
        }

        let any_stage_failed = all_results.iter().any(|r| matches!(r.status, StageStatus::Failed));
        let report_exists = self.store.get_report_for_scan(scan.id).await?.is_some();
        let status = terminal_status(report_exists, any_stage_failed, cancel.is_cancelled() || deadline_exceeded);

        let message = if deadline_exceeded {
            Some("scan deadline exceeded".to_string())
        } else if cancel.is_cancelled() {
            Some("scan cancelled".to_string())
        } else if any_stage_failed {
            Some("one or more stages failed".to_string())
        } else {
            None
        };

        scan.transition(status, message)?;
        self.store.upsert_scan(&scan).await?;
        self.progress.publish(scan.id, ProgressEventKind::Complete { status: format!("{status:?}") });
        info!(scan_id = %scan.id, status = ?status, "scan finished");

        Ok(scan)
    }

    async fn run_capability_stage(
        &self,
        scan: &ScanRequest,
        input: &CollectInput,
        pool: &Arc<EvidencePool>,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> anyhow::Result<StageResult> {
        let started = Instant::now();
        let capabilities = capabilities_for(stage);

        let outcomes = dispatch::run_capabilities(
            scan.id,
            input,
            capabilities,
            &self.registry,
            &self.queues,
            &self.resilience,
            &self.clock,
            &self.tunables,
            &self.progress,
            self.tunables.stage_timeout(),
            cancel,
        )
        .await;

        let mut evidence_count = 0usize;
        let mut retries = 0u32;
        let mut errors = Vec::new();

        for outcome in outcomes {
            evidence_count += outcome.evidence.len();
            retries += outcome.retries;
            if let Some(error) = outcome.error {
                errors.push(format!("{:?}: {error}", outcome.capability));
            } else {
                pool.offer_batch(outcome.evidence);
            }
        }

        if pool.flush_if_due() {
            pool.flush().await?;
        }

        self.progress.publish(scan.id, ProgressEventKind::EvidenceCollected { count: evidence_count });

        let status = if errors.is_empty() {
            StageStatus::Success
        } else if evidence_count > 0 {
            StageStatus::Partial
        } else {
            StageStatus::Failed
        };

        Ok(StageResult {
            stage,
            status,
            retries,
            duration_ms: started.elapsed().as_millis() as u64,
            evidence_count,
            error: if errors.is_empty() { None } else { Some(errors.join("; ")) },
        })
    }

    async fn run_evidence_processing(&self, pool: &Arc<EvidencePool>) -> anyhow::Result<StageResult> {
        let started = Instant::now();
        let flushed = pool.flush().await?;
        Ok(StageResult {
            stage: Stage::EvidenceProcessing,
            status: StageStatus::Success,
            retries: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            evidence_count: flushed,
            error: None,
        })
    }

    async fn run_report_generation(&self, scan: &ScanRequest, thesis: Option<&Thesis>, stage: Stage) -> anyhow::Result<StageResult> {
        let started = Instant::now();
        self.progress.publish(scan.id, ProgressEventKind::SynthesisStart);

        let evidence = self.store.get_evidence_for_scan(scan.id, None).await?;
        let (report, citations) = self.synthesizer.synthesize(scan, thesis, &evidence).await?;

        self.store.insert_report(&report).await?;
        self.store.insert_citations_batch(&citations).await?;
        self.progress.publish(scan.id, ProgressEventKind::ReportPersisted { report_id: report.id });

        Ok(StageResult {
            stage,
            status: StageStatus::Success,
            retries: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            evidence_count: evidence.len(),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::collectors::heuristic::HeuristicFallbackCollector;
    use crate::domain::{AnalysisDepth, Company};
    use crate::store::memory::MemoryStore;
    use crate::synthesizer::{DeterministicAnalyzer, Synthesizer};

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(CollectorRegistry::new());
        registry.register(Arc::new(HeuristicFallbackCollector::new()), 0);
        let clock = Arc::new(SystemClock) as Arc<dyn Clock>;
        let synthesizer = Arc::new(Synthesizer::new(Arc::new(DeterministicAnalyzer), clock.clone(), Tunables::default(), "offline"));
        Orchestrator::new(store, registry, synthesizer, clock, Tunables::default())
    }

    #[tokio::test]
    async fn shallow_scan_with_no_thesis_reaches_a_terminal_status() {
        let orchestrator = orchestrator();
        let scan = ScanRequest::new(
            Company { name: "Acme".into(), website: "https://acme.test".into() },
            AnalysisDepth::Shallow,
            None,
        );
        let finished = orchestrator.run(scan, None, CancellationToken::new()).await.unwrap();
        assert!(finished.status.is_terminal());
    }

    #[tokio::test]
    async fn cancelling_before_run_still_produces_a_degraded_report() {
        let orchestrator = orchestrator();
        let scan = ScanRequest::new(
            Company { name: "Acme".into(), website: "https://acme.test".into() },
            AnalysisDepth::Shallow,
            None,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let finished = orchestrator.run(scan, None, cancel).await.unwrap();
        assert_eq!(finished.status, ScanStatus::CompletedWithErrors);
    }

    #[test]
    fn terminal_status_mapping_prefers_failed_when_no_report_exists() {
        assert_eq!(terminal_status(false, false, false), ScanStatus::Failed);
        assert_eq!(terminal_status(true, false, false), ScanStatus::AwaitingReview);
        assert_eq!(terminal_status(true, true, false), ScanStatus::CompletedWithErrors);
        assert_eq!(terminal_status(true, false, true), ScanStatus::CompletedWithErrors);
    }
}
