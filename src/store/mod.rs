//! Persistence surface (spec §6 "Store contract").
//!
//! `Store` is the narrow trait every other component depends on so the
//! pipeline can run its unit tests against [`memory::MemoryStore`] without
//! touching a filesystem, while [`sqlite::SqliteStore`] backs the running
//! service.

pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Citation, Evidence, EvidenceCollection, Report, ScanRequest, StageResult,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_scan(&self, scan: &ScanRequest) -> anyhow::Result<()>;
    async fn get_scan(&self, id: Uuid) -> anyhow::Result<Option<ScanRequest>>;

    async fn upsert_evidence_collection(&self, collection: &EvidenceCollection) -> anyhow::Result<()>;
    async fn get_evidence_collection(&self, scan_id: Uuid) -> anyhow::Result<Option<EvidenceCollection>>;

    /// Batch-inserts evidence keyed by `(scan_id, fingerprint)`.
    ///
    /// On a fingerprint collision the existing row is kept unless the new
    /// item has strictly higher confidence, in which case it replaces the
    /// stored item's content and sources are merged — implementing the
    /// "highest confidence wins, sources merge" invariant transactionally.
    async fn insert_evidence_batch(&self, items: &[Evidence]) -> anyhow::Result<usize>;
    async fn get_evidence_for_scan(&self, scan_id: Uuid, limit: Option<usize>) -> anyhow::Result<Vec<Evidence>>;
    async fn get_evidence_by_id(&self, id: Uuid) -> anyhow::Result<Option<Evidence>>;

    async fn append_stage_result(&self, scan_id: Uuid, result: &StageResult) -> anyhow::Result<()>;
    async fn get_stage_results(&self, scan_id: Uuid) -> anyhow::Result<Vec<StageResult>>;

    async fn insert_report(&self, report: &Report) -> anyhow::Result<()>;
    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>>;
    async fn get_report_for_scan(&self, scan_id: Uuid) -> anyhow::Result<Option<Report>>;

    async fn insert_citations_batch(&self, citations: &[Citation]) -> anyhow::Result<()>;
    async fn get_citations_for_report(&self, report_id: Uuid) -> anyhow::Result<Vec<Citation>>;
}
