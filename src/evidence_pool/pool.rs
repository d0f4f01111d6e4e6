//! The Evidence Pool (spec §4.5): dedup index, scoring, and batched
//! persistence for a scan's collected evidence.
//!
//! The dedup index is a single mutex-guarded fingerprint map, mirroring the
//! single `HashMap<&'static str, RollingStats>` the teacher's
//! `SignalQualityGate` keeps under one lock rather than sharding by key —
//! the per-scan pool is short-lived and low-volume enough that contention
//! isn't a concern.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Tunables;
use crate::domain::{Evidence, EvidenceCollection, EvidenceCollectionStatus, PillarQualitySummary};
use crate::resilience::retry_with_backoff;
use crate::store::Store;

use super::{fingerprint, scoring};

struct DedupIndex {
    /// fingerprint -> index into `buffer` of the currently-kept item.
    by_fingerprint: HashMap<String, usize>,
    buffer: Vec<Evidence>,
}

impl DedupIndex {
    fn new() -> Self {
        Self { by_fingerprint: HashMap::new(), buffer: Vec::new() }
    }

    /// Inserts or merges `item`. On a fingerprint collision the higher
    /// scoring item wins; sources and extraction trails from the loser are
    /// merged into the survivor (spec §4.5 "dedup merge").
    fn offer(&mut self, mut item: Evidence) {
        item.fingerprint = fingerprint::fingerprint(&item);
        item.score = Some(scoring::score(&item));

        if let Some(&idx) = self.by_fingerprint.get(&item.fingerprint) {
            let existing = &mut self.buffer[idx];
            if item.score > existing.score {
                let mut merged_sources = item.sources.clone();
                merged_sources.extend(existing.sources.drain(..));
                let mut merged_trail = existing.metadata.extraction_trail.clone();
                merged_trail.extend(item.metadata.extraction_trail.iter().cloned());
                item.sources = merged_sources;
                item.metadata.extraction_trail = merged_trail;
                *existing = item;
            } else {
                existing.sources.extend(item.sources);
                existing
                    .metadata
                    .extraction_trail
                    .extend(item.metadata.extraction_trail);
            }
            return;
        }

        let idx = self.buffer.len();
        self.by_fingerprint.insert(item.fingerprint.clone(), idx);
        self.buffer.push(item);
    }

    fn drain_unflushed(&mut self, flushed: &HashSet<Uuid>) -> Vec<Evidence> {
        let remaining: Vec<Evidence> = self
            .buffer
            .iter()
            .filter(|e| !flushed.contains(&e.id))
            .cloned()
            .collect();
        remaining
    }
}

pub struct EvidencePool {
    scan_id: Uuid,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    tunables: Tunables,
    index: parking_lot::Mutex<DedupIndex>,
    flushed: parking_lot::Mutex<HashSet<Uuid>>,
}

impl EvidencePool {
    pub fn new(scan_id: Uuid, store: Arc<dyn Store>, clock: Arc<dyn Clock>, tunables: Tunables) -> Self {
        Self {
            scan_id,
            store,
            clock,
            tunables,
            index: parking_lot::Mutex::new(DedupIndex::new()),
            flushed: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    /// Offers a batch of freshly collected evidence into the pool's dedup
    /// index. Does not persist; call [`Self::flush`] (or [`Self::flush_if_due`])
    /// to write through to the store.
    pub fn offer_batch(&self, items: Vec<Evidence>) {
        let mut index = self.index.lock();
        for item in items {
            index.offer(item);
        }
    }

    fn unflushed_count(&self) -> usize {
        let index = self.index.lock();
        let flushed = self.flushed.lock();
        index.buffer.iter().filter(|e| !flushed.contains(&e.id)).count()
    }

    pub fn flush_if_due(&self) -> bool {
        self.unflushed_count() >= self.tunables.evidence_batch_size
    }

    /// Flushes unflushed items to the store in batches, retrying each batch
    /// with backoff. A batch that fails every retry is dropped from this
    /// flush (not re-buffered) and the collection is marked `partial`
    /// rather than aborting the scan (spec §4.5 "flush failure semantics").
    pub async fn flush(&self) -> anyhow::Result<usize> {
        let pending = {
            let mut index = self.index.lock();
            let flushed = self.flushed.lock();
            index.drain_unflushed(&flushed)
        };
        if pending.is_empty() {
            return Ok(0);
        }

        let mut total_flushed = 0usize;
        let mut any_batch_failed = false;

        for chunk in pending.chunks(self.tunables.evidence_batch_size) {
            let chunk_ids: Vec<Uuid> = chunk.iter().map(|e| e.id).collect();
            let chunk_owned = chunk.to_vec();
            let store = self.store.clone();

            let result = retry_with_backoff(
                "evidence_pool_flush",
                &self.tunables,
                self.clock.clone(),
                || {
                    let store = store.clone();
                    let batch = chunk_owned.clone();
                    async move {
                        store
                            .insert_evidence_batch(&batch)
                            .await
                            .map_err(|e| crate::error::CollectorError::Internal(e.to_string()))
                    }
                },
            )
            .await;

            match result {
                Ok(inserted) => {
                    total_flushed += inserted;
                    self.flushed.lock().extend(chunk_ids);
                }
                Err(err) => {
                    any_batch_failed = true;
                    warn!(scan_id = %self.scan_id, error = %err, "evidence batch flush failed after retries");
                }
            }
        }

        if any_batch_failed {
            self.mark_collection_partial().await?;
        }

        Ok(total_flushed)
    }

    async fn mark_collection_partial(&self) -> anyhow::Result<()> {
        let mut collection = self
            .store
            .get_evidence_collection(self.scan_id)
            .await?
            .unwrap_or_else(|| EvidenceCollection::new(self.scan_id));
        collection.status = EvidenceCollectionStatus::Partial;
        collection.count = self.flushed.lock().len();
        self.store.upsert_evidence_collection(&collection).await
    }

    /// Per-pillar quality summary over everything currently in the pool
    /// (flushed or not), per spec §4.5.
    pub fn quality_summary(&self) -> Vec<PillarQualitySummary> {
        let index = self.index.lock();
        let mut by_pillar: HashMap<String, Vec<f64>> = HashMap::new();
        for item in &index.buffer {
            by_pillar
                .entry(item.pillar_tag.clone())
                .or_default()
                .push(item.score.unwrap_or(0.0));
        }

        by_pillar
            .into_iter()
            .map(|(pillar_tag, scores)| {
                let count = scores.len();
                let average_score = if count == 0 {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / count as f64
                };
                let above_threshold_count = scores
                    .iter()
                    .filter(|&&s| s >= self.tunables.quality_threshold)
                    .count();
                PillarQualitySummary { pillar_tag, count, average_score, above_threshold_count }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::{EvidenceContent, EvidenceMetadata, EvidenceType, SourceDescriptor};
    use crate::store::memory::MemoryStore;

    fn sample_evidence(scan_id: Uuid, summary: &str, confidence: f64) -> Evidence {
        let mut metadata = EvidenceMetadata::default();
        metadata.confidence = confidence;
        Evidence::new(
            scan_id,
            "technology",
            EvidenceType::TechStack,
            SourceDescriptor {
                kind: "web".into(),
                url_or_query: "https://acme.test/about".into(),
                timestamp: chrono::Utc::now(),
            },
            EvidenceContent { raw: String::new(), processed_summary: summary.into(), title: None },
            metadata,
        )
    }

    #[test]
    fn duplicate_evidence_merges_into_higher_scoring_survivor() {
        let scan_id = Uuid::new_v4();
        let pool = EvidencePool::new(
            scan_id,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Tunables::default(),
        );
        pool.offer_batch(vec![
            sample_evidence(scan_id, "Uses React and Postgres", 0.4),
            sample_evidence(scan_id, "Uses React and Postgres", 0.9),
        ]);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn flush_persists_to_store_and_clears_unflushed_count() {
        let scan_id = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new());
        let pool = EvidencePool::new(scan_id, store.clone(), Arc::new(SystemClock), Tunables::default());
        pool.offer_batch(vec![sample_evidence(scan_id, "Evidence A", 0.6)]);
        let flushed = pool.flush().await.unwrap();
        assert_eq!(flushed, 1);
        assert_eq!(store.get_evidence_for_scan(scan_id, None).await.unwrap().len(), 1);
        assert_eq!(pool.flush().await.unwrap(), 0);
    }

    #[test]
    fn quality_summary_groups_by_pillar() {
        let scan_id = Uuid::new_v4();
        let pool = EvidencePool::new(
            scan_id,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Tunables::default(),
        );
        pool.offer_batch(vec![
            sample_evidence(scan_id, "Evidence A", 0.9),
            sample_evidence(scan_id, "Evidence B", 0.9),
        ]);
        let summary = pool.quality_summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].pillar_tag, "technology");
    }
}
