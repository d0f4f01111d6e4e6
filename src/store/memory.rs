//! In-memory [`Store`] used by unit tests across the crate that need a
//! fast, filesystem-free backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::Store;
use crate::domain::{Citation, Evidence, EvidenceCollection, Report, ScanRequest, StageResult};

#[derive(Default)]
struct Inner {
    scans: HashMap<Uuid, ScanRequest>,
    collections: HashMap<Uuid, EvidenceCollection>,
    evidence: HashMap<Uuid, Evidence>,
    fingerprints: HashMap<(Uuid, String), Uuid>,
    stage_results: HashMap<Uuid, Vec<StageResult>>,
    reports_by_id: HashMap<Uuid, Report>,
    reports_by_scan: HashMap<Uuid, Uuid>,
    citations: HashMap<Uuid, Vec<Citation>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_scan(&self, scan: &ScanRequest) -> anyhow::Result<()> {
        self.inner.lock().scans.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> anyhow::Result<Option<ScanRequest>> {
        Ok(self.inner.lock().scans.get(&id).cloned())
    }

    async fn upsert_evidence_collection(&self, collection: &EvidenceCollection) -> anyhow::Result<()> {
        self.inner
            .lock()
            .collections
            .insert(collection.scan_id, collection.clone());
        Ok(())
    }

    async fn get_evidence_collection(&self, scan_id: Uuid) -> anyhow::Result<Option<EvidenceCollection>> {
        Ok(self.inner.lock().collections.get(&scan_id).cloned())
    }

    async fn insert_evidence_batch(&self, items: &[Evidence]) -> anyhow::Result<usize> {
        let mut inner = self.inner.lock();
        let mut inserted = 0usize;
        for item in items {
            let key = (item.scan_id, item.fingerprint.clone());
            if inner.fingerprints.contains_key(&key) {
                continue;
            }
            inner.fingerprints.insert(key, item.id);
            inner.evidence.insert(item.id, item.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get_evidence_for_scan(&self, scan_id: Uuid, limit: Option<usize>) -> anyhow::Result<Vec<Evidence>> {
        let inner = self.inner.lock();
        let mut items: Vec<Evidence> = inner
            .evidence
            .values()
            .filter(|e| e.scan_id == scan_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn get_evidence_by_id(&self, id: Uuid) -> anyhow::Result<Option<Evidence>> {
        Ok(self.inner.lock().evidence.get(&id).cloned())
    }

    async fn append_stage_result(&self, scan_id: Uuid, result: &StageResult) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let results = inner.stage_results.entry(scan_id).or_default();
        if let Some(existing) = results.iter_mut().find(|r| r.stage == result.stage) {
            *existing = result.clone();
        } else {
            results.push(result.clone());
        }
        Ok(())
    }

    async fn get_stage_results(&self, scan_id: Uuid) -> anyhow::Result<Vec<StageResult>> {
        Ok(self.inner.lock().stage_results.get(&scan_id).cloned().unwrap_or_default())
    }

    async fn insert_report(&self, report: &Report) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.reports_by_scan.insert(report.scan_id, report.id);
        inner.reports_by_id.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        Ok(self.inner.lock().reports_by_id.get(&id).cloned())
    }

    async fn get_report_for_scan(&self, scan_id: Uuid) -> anyhow::Result<Option<Report>> {
        let inner = self.inner.lock();
        let Some(report_id) = inner.reports_by_scan.get(&scan_id) else {
            return Ok(None);
        };
        Ok(inner.reports_by_id.get(report_id).cloned())
    }

    async fn insert_citations_batch(&self, citations: &[Citation]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        for c in citations {
            inner.citations.entry(c.report_id).or_default().push(c.clone());
        }
        Ok(())
    }

    async fn get_citations_for_report(&self, report_id: Uuid) -> anyhow::Result<Vec<Citation>> {
        let mut citations = self.inner.lock().citations.get(&report_id).cloned().unwrap_or_default();
        citations.sort_by_key(|c| c.number);
        Ok(citations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisDepth, Company};

    #[tokio::test]
    async fn dedups_evidence_by_scan_and_fingerprint() {
        let store = MemoryStore::new();
        let scan_id = Uuid::new_v4();
        let mut e = Evidence::new(
            scan_id,
            "technology",
            crate::domain::EvidenceType::TechStack,
            crate::domain::SourceDescriptor {
                kind: "web".into(),
                url_or_query: "https://acme.test".into(),
                timestamp: chrono::Utc::now(),
            },
            crate::domain::EvidenceContent::default(),
            crate::domain::EvidenceMetadata::default(),
        );
        e.fingerprint = "fp-1".into();

        let first = store.insert_evidence_batch(&[e.clone()]).await.unwrap();
        let second = store.insert_evidence_batch(&[e]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn round_trips_scan_and_report() {
        let store = MemoryStore::new();
        let scan = ScanRequest::new(
            Company {
                name: "Acme".into(),
                website: "https://acme.test".into(),
            },
            AnalysisDepth::Deep,
            None,
        );
        store.upsert_scan(&scan).await.unwrap();
        assert!(store.get_scan(scan.id).await.unwrap().is_some());

        let report = Report {
            id: Uuid::new_v4(),
            scan_id: scan.id,
            executive_summary: "summary".into(),
            investment_score: 7.5,
            sections: Vec::new(),
            aggregate_quality_score: 0.8,
            evidence_count: 3,
            generator_model: "test-model".into(),
        };
        store.insert_report(&report).await.unwrap();
        let loaded = store.get_report_for_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, report.id);
    }
}
