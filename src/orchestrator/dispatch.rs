//! Executes one stage's capabilities: enqueues a representative job per
//! capability, claims it back off the same queue, and runs it through the
//! full timeout → circuit breaker → retry → fallback composition (spec §4.3,
//! §4.4 step (b)/(c)).
//!
//! Each capability's job carries `max_attempts = 1` on its queue: the
//! resilience layer already performs in-process retries across collectors in
//! the fallback chain, so the queue's own attempt counter exists purely to
//! exercise at-least-once delivery and dead-letter disposition on top of a
//! resilience-layer failure that exhausted every fallback (spec §8 property 9).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::collectors::{CollectInput, CollectOutput, Collector, CollectorRegistry};
use crate::config::Tunables;
use crate::domain::{Capability, CollectorJob, Evidence, ProgressEventKind};
use crate::error::CollectorError;
use crate::progress::ProgressHub;
use crate::queue::QueueRegistry;
use crate::resilience::{retry_with_backoff, should_fall_back, ResilienceRegistry};

use super::cancel::CancellationToken;
use super::stage_plan::queue_kind_for;

const STAGE_CONCURRENCY: usize = 6;

pub struct CapabilityOutcome {
    pub capability: Capability,
    pub evidence: Vec<Evidence>,
    pub retries: u32,
    pub error: Option<String>,
}

/// Enqueues and immediately drains one job per requested capability,
/// returning every capability's outcome. Capabilities with no registered
/// collector are silently skipped (zero evidence, no error — nothing to run).
pub async fn run_capabilities(
    scan_id: Uuid,
    input: &CollectInput,
    capabilities: &[Capability],
    registry: &CollectorRegistry,
    queues: &QueueRegistry,
    resilience: &Arc<ResilienceRegistry>,
    clock: &Arc<dyn Clock>,
    tunables: &Tunables,
    progress: &ProgressHub,
    stage_deadline: Duration,
    cancel: &CancellationToken,
) -> Vec<CapabilityOutcome> {
    if cancel.is_cancelled() {
        return Vec::new();
    }

    let runnable: Vec<Capability> = capabilities
        .iter()
        .copied()
        .filter(|cap| !registry.by_capability(*cap).is_empty())
        .collect();

    stream::iter(runnable.into_iter().map(|capability| {
        let input = input.clone();
        let registry = registry;
        let queues = queues;
        let resilience = resilience.clone();
        let clock = clock.clone();
        let tunables = tunables.clone();
        let progress = progress;
        let cancel = cancel.clone();

        async move {
            if cancel.is_cancelled() {
                return CapabilityOutcome {
                    capability,
                    evidence: Vec::new(),
                    retries: 0,
                    error: Some(CollectorError::Canceled.to_string()),
                };
            }

            let candidates = registry.by_capability(capability);
            // Keyed per (kind, scan, capability) so two capabilities sharing a
            // kind never contend over the same queue's claim: each capability
            // gets exactly the one job it enqueued.
            let queue_key = format!("{}:{}:{:?}", queue_kind_for(capability), scan_id, capability);
            let queue = queues.queue_for(&queue_key);

            let job = CollectorJob::new(
                scan_id,
                candidates[0].name(),
                queue_kind_for(capability),
                json!({ "capability": format!("{capability:?}") }),
                priority_for(capability),
            );
            queue.enqueue(job);

            let Some(claimed) = queue.claim() else {
                return CapabilityOutcome { capability, evidence: Vec::new(), retries: 0, error: None };
            };

            let retries = Arc::new(AtomicU32::new(0));
            let result = invoke_with_fallback(
                &input,
                &candidates,
                &resilience,
                &clock,
                &tunables,
                progress,
                scan_id,
                stage_deadline,
                retries.clone(),
                &cancel,
            )
            .await;

            match &result {
                Ok(_) => queue.ack(claimed.id),
                Err(_) => queue.nack(claimed.id),
            }

            match result {
                Ok(evidence) => CapabilityOutcome {
                    capability,
                    evidence,
                    retries: retries.load(Ordering::SeqCst),
                    error: None,
                },
                Err(err) => CapabilityOutcome {
                    capability,
                    evidence: Vec::new(),
                    retries: retries.load(Ordering::SeqCst),
                    error: Some(err.to_string()),
                },
            }
        }
    }))
    .buffer_unordered(STAGE_CONCURRENCY)
    .collect()
    .await
}

fn priority_for(capability: Capability) -> u8 {
    match capability {
        Capability::Web | Capability::Tech => 7,
        Capability::Security | Capability::Tls | Capability::Vulnerability => 6,
        _ => 5,
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Walks `candidates` (priority-ordered, ending in the heuristic fallback) in
/// order. Each candidate is itself wrapped in timeout → circuit breaker →
/// retry-with-backoff; a candidate that exhausts retries or finds its breaker
/// open hands off to the next one (spec §4.3's outer-to-inner composition).
fn invoke_with_fallback<'a>(
    input: &'a CollectInput,
    candidates: &'a [Arc<dyn Collector>],
    resilience: &'a Arc<ResilienceRegistry>,
    clock: &'a Arc<dyn Clock>,
    tunables: &'a Tunables,
    progress: &'a ProgressHub,
    scan_id: Uuid,
    stage_deadline: Duration,
    retries: Arc<AtomicU32>,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<Vec<Evidence>, CollectorError>> {
    Box::pin(async move {
        let mut last_err = CollectorError::Internal("no collector registered for capability".into());

        for collector in candidates {
            if cancel.is_cancelled() {
                return Err(CollectorError::Canceled);
            }

            let name = collector.name().to_string();

            if resilience.is_open(&name, &**clock) {
                last_err = CollectorError::CircuitOpen { collector: name.clone() };
                progress.publish(
                    scan_id,
                    ProgressEventKind::CollectorError {
                        collector: name,
                        kind: last_err.kind_label().into(),
                        message: last_err.to_string(),
                    },
                );
                continue;
            }

            progress.publish(scan_id, ProgressEventKind::CollectorStart { collector: name.clone() });

            let deadline = collector.suggested_timeout().min(stage_deadline);
            let attempt_counter = retries.clone();
            let op_collector = collector.clone();
            let op_input = input.clone();

            let attempt_result = tokio::time::timeout(
                deadline,
                retry_with_backoff(&name, tunables, clock.clone(), {
                    let op_collector = op_collector.clone();
                    let op_input = op_input.clone();
                    let attempt_counter = attempt_counter.clone();
                    move || {
                        let collector = op_collector.clone();
                        let input = op_input.clone();
                        let attempt_counter = attempt_counter.clone();
                        async move {
                            attempt_counter.fetch_add(1, Ordering::SeqCst);
                            collect_as_result(&*collector, &input).await
                        }
                    }
                }),
            )
            .await;

            let outcome = match attempt_result {
                Ok(inner) => inner,
                Err(_) => Err(CollectorError::Timeout(deadline)),
            };

            match outcome {
                Ok(evidence) => {
                    resilience.record_success(&name);
                    progress.publish(
                        scan_id,
                        ProgressEventKind::CollectorSuccess { collector: name, evidence_count: evidence.len() },
                    );
                    return Ok(evidence);
                }
                Err(err) => {
                    if err.counts_toward_breaker() {
                        resilience.record_failure(&name, &**clock);
                    }
                    progress.publish(
                        scan_id,
                        ProgressEventKind::CollectorError {
                            collector: name.clone(),
                            kind: err.kind_label().into(),
                            message: err.to_string(),
                        },
                    );
                    if !should_fall_back(&err) {
                        return Err(err);
                    }
                    warn!(collector = %name, error = %err, "collector failed, trying next in fallback chain");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    })
}

async fn collect_as_result(collector: &dyn Collector, input: &CollectInput) -> Result<Vec<Evidence>, CollectorError> {
    let output: CollectOutput = collector.collect(input).await;
    match output.err {
        None => Ok(output.evidence),
        Some(_err) if output.partial_ok => Ok(output.evidence),
        Some(err) => Err(err),
    }
}
