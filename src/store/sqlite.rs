//! SQLite-backed [`Store`] implementation.
//!
//! Grounded on `signals/db_storage.rs`'s connection management and
//! `INSERT OR IGNORE` / `BEGIN IMMEDIATE` batch pattern, scaled to this
//! service's row volumes: a handful of scans and a few hundred evidence
//! rows per scan rather than millions of signals.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{info, warn};
use uuid::Uuid;

use super::schema::SCHEMA_SQL;
use super::Store;
use crate::domain::{
    AnalysisDepth, Citation, Company, Evidence, EvidenceCollection, EvidenceCollectionStatus,
    Report, ReportSection, ScanRequest, ScanStatus, Stage, StageResult, StageStatus,
};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open database at {db_path}"))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!(journal_mode, "WAL mode not active");
        }

        let scan_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))
            .unwrap_or(0);
        info!(db_path, scan_count, "sqlite store initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn analysis_depth_str(depth: AnalysisDepth) -> &'static str {
        match depth {
            AnalysisDepth::Shallow => "shallow",
            AnalysisDepth::Deep => "deep",
            AnalysisDepth::Exhaustive => "exhaustive",
        }
    }

    fn parse_analysis_depth(s: &str) -> AnalysisDepth {
        match s {
            "deep" => AnalysisDepth::Deep,
            "exhaustive" => AnalysisDepth::Exhaustive,
            _ => AnalysisDepth::Shallow,
        }
    }

    fn scan_status_str(status: ScanStatus) -> &'static str {
        match status {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Canceling => "canceling",
            ScanStatus::AwaitingReview => "awaiting_review",
            ScanStatus::CompletedWithErrors => "completed_with_errors",
            ScanStatus::Failed => "failed",
        }
    }

    fn parse_scan_status(s: &str) -> ScanStatus {
        match s {
            "running" => ScanStatus::Running,
            "canceling" => ScanStatus::Canceling,
            "awaiting_review" => ScanStatus::AwaitingReview,
            "completed_with_errors" => ScanStatus::CompletedWithErrors,
            "failed" => ScanStatus::Failed,
            _ => ScanStatus::Pending,
        }
    }

    fn row_to_scan(row: &rusqlite::Row) -> rusqlite::Result<ScanRequest> {
        let id: String = row.get("id")?;
        let depth: String = row.get("analysis_depth")?;
        let status: String = row.get("status")?;
        let thesis_id: Option<String> = row.get("thesis_id")?;
        Ok(ScanRequest {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            company: Company {
                name: row.get("company_name")?,
                website: row.get("company_website")?,
            },
            investor_profile: row.get("investor_profile")?,
            analysis_depth: Self::parse_analysis_depth(&depth),
            thesis_id: thesis_id.and_then(|s| Uuid::parse_str(&s).ok()),
            status: Self::parse_scan_status(&status),
            status_message: row.get("status_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn row_to_evidence(row: &rusqlite::Row) -> rusqlite::Result<Evidence> {
        let id: String = row.get("id")?;
        let scan_id: String = row.get("scan_id")?;
        let evidence_type_json: String = row.get("evidence_type")?;
        let sources_json: String = row.get("sources_json")?;
        let content_json: String = row.get("content_json")?;
        let metadata_json: String = row.get("metadata_json")?;
        let embedding_json: Option<String> = row.get("embedding_json")?;

        Ok(Evidence {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            scan_id: Uuid::parse_str(&scan_id).unwrap_or_default(),
            pillar_tag: row.get("pillar_tag")?,
            evidence_type: serde_json::from_str(&evidence_type_json).unwrap_or(
                crate::domain::EvidenceType::Other("unknown".into()),
            ),
            sources: serde_json::from_str(&sources_json).unwrap_or_default(),
            content: serde_json::from_str(&content_json).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata_json)
                .unwrap_or_else(|_| crate::domain::EvidenceMetadata::default()),
            embedding: embedding_json.and_then(|s| serde_json::from_str(&s).ok()),
            fingerprint: row.get("fingerprint")?,
            score: row.get("score")?,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_scan(&self, scan: &ScanRequest) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scans (
                id, company_name, company_website, investor_profile, analysis_depth,
                thesis_id, status, status_message, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                status_message = excluded.status_message,
                updated_at = excluded.updated_at",
            params![
                scan.id.to_string(),
                scan.company.name,
                scan.company.website,
                scan.investor_profile,
                Self::analysis_depth_str(scan.analysis_depth),
                scan.thesis_id.map(|id| id.to_string()),
                Self::scan_status_str(scan.status),
                scan.status_message,
                scan.created_at,
                scan.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<ScanRequest>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT * FROM scans WHERE id = ?1")?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_scan(row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_evidence_collection(&self, collection: &EvidenceCollection) -> Result<()> {
        let status = match collection.status {
            EvidenceCollectionStatus::Collecting => "collecting",
            EvidenceCollectionStatus::Partial => "partial",
            EvidenceCollectionStatus::Closed => "closed",
        };
        let metadata_json = serde_json::to_string(&collection.metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO evidence_collections (id, scan_id, status, count, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                count = excluded.count,
                metadata_json = excluded.metadata_json",
            params![
                collection.id.to_string(),
                collection.scan_id.to_string(),
                status,
                collection.count as i64,
                metadata_json,
            ],
        )?;
        Ok(())
    }

    async fn get_evidence_collection(&self, scan_id: Uuid) -> Result<Option<EvidenceCollection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM evidence_collections WHERE scan_id = ?1 ORDER BY rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![scan_id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let id: String = row.get("id")?;
        let status: String = row.get("status")?;
        let metadata_json: String = row.get("metadata_json")?;
        Ok(Some(EvidenceCollection {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            scan_id,
            status: match status.as_str() {
                "partial" => EvidenceCollectionStatus::Partial,
                "closed" => EvidenceCollectionStatus::Closed,
                _ => EvidenceCollectionStatus::Collecting,
            },
            count: row.get::<_, i64>("count")? as usize,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        }))
    }

    async fn insert_evidence_batch(&self, items: &[Evidence]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<_> = items
            .iter()
            .map(|e| {
                (
                    e,
                    serde_json::to_string(&e.evidence_type).unwrap_or_default(),
                    serde_json::to_string(&e.sources).unwrap_or_default(),
                    serde_json::to_string(&e.content).unwrap_or_default(),
                    serde_json::to_string(&e.metadata).unwrap_or_default(),
                    e.embedding
                        .as_ref()
                        .map(|v| serde_json::to_string(v).unwrap_or_default()),
                )
            })
            .collect();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;

        for (evidence, type_json, sources_json, content_json, metadata_json, embedding_json) in
            &serialized
        {
            let changes = tx.execute(
                "INSERT OR IGNORE INTO evidence (
                    id, scan_id, pillar_tag, evidence_type, sources_json, content_json,
                    metadata_json, embedding_json, fingerprint, score
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    evidence.id.to_string(),
                    evidence.scan_id.to_string(),
                    evidence.pillar_tag,
                    type_json,
                    sources_json,
                    content_json,
                    metadata_json,
                    embedding_json,
                    evidence.fingerprint,
                    evidence.score,
                ],
            )?;
            inserted += changes;
        }

        tx.commit()?;
        Ok(inserted)
    }

    async fn get_evidence_for_scan(&self, scan_id: Uuid, limit: Option<usize>) -> Result<Vec<Evidence>> {
        let conn = self.conn.lock();
        let limit = limit.unwrap_or(usize::MAX) as i64;
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM evidence WHERE scan_id = ?1 ORDER BY score DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![scan_id.to_string(), limit], Self::row_to_evidence)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn get_evidence_by_id(&self, id: Uuid) -> Result<Option<Evidence>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT * FROM evidence WHERE id = ?1")?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_evidence(row)?)),
            None => Ok(None),
        }
    }

    async fn append_stage_result(&self, scan_id: Uuid, result: &StageResult) -> Result<()> {
        let status = match result.status {
            StageStatus::Success => "success",
            StageStatus::Partial => "partial",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO stage_results (
                scan_id, stage, status, retries, duration_ms, evidence_count, error
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(scan_id, stage) DO UPDATE SET
                status = excluded.status,
                retries = excluded.retries,
                duration_ms = excluded.duration_ms,
                evidence_count = excluded.evidence_count,
                error = excluded.error",
            params![
                scan_id.to_string(),
                result.stage.name(),
                status,
                result.retries,
                result.duration_ms as i64,
                result.evidence_count as i64,
                result.error,
            ],
        )?;
        Ok(())
    }

    async fn get_stage_results(&self, scan_id: Uuid) -> Result<Vec<StageResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM stage_results WHERE scan_id = ?1 ORDER BY recorded_at ASC",
        )?;
        let rows = stmt
            .query_map(params![scan_id.to_string()], |row| {
                let stage_name: String = row.get("stage")?;
                let status: String = row.get("status")?;
                let stage = Stage::CANONICAL_ORDER
                    .into_iter()
                    .find(|s| s.name() == stage_name)
                    .unwrap_or(Stage::InitialEvidence);
                Ok(StageResult {
                    stage,
                    status: match status.as_str() {
                        "partial" => StageStatus::Partial,
                        "failed" => StageStatus::Failed,
                        "skipped" => StageStatus::Skipped,
                        _ => StageStatus::Success,
                    },
                    retries: row.get("retries")?,
                    duration_ms: row.get::<_, i64>("duration_ms")? as u64,
                    evidence_count: row.get::<_, i64>("evidence_count")? as usize,
                    error: row.get("error")?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        let sections_json = serde_json::to_string(&report.sections)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reports (
                id, scan_id, executive_summary, investment_score, sections_json,
                aggregate_quality_score, evidence_count, generator_model
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(scan_id) DO UPDATE SET
                executive_summary = excluded.executive_summary,
                investment_score = excluded.investment_score,
                sections_json = excluded.sections_json,
                aggregate_quality_score = excluded.aggregate_quality_score,
                evidence_count = excluded.evidence_count,
                generator_model = excluded.generator_model",
            params![
                report.id.to_string(),
                report.scan_id.to_string(),
                report.executive_summary,
                report.investment_score,
                sections_json,
                report.aggregate_quality_score,
                report.evidence_count as i64,
                report.generator_model,
            ],
        )?;
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT * FROM reports WHERE id = ?1")?;
        let mut rows = stmt.query(params![id.to_string()])?;
        row_to_report(rows.next()?)
    }

    async fn get_report_for_scan(&self, scan_id: Uuid) -> Result<Option<Report>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT * FROM reports WHERE scan_id = ?1")?;
        let mut rows = stmt.query(params![scan_id.to_string()])?;
        row_to_report(rows.next()?)
    }

    async fn insert_citations_batch(&self, citations: &[Citation]) -> Result<()> {
        if citations.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for c in citations {
            tx.execute(
                "INSERT OR IGNORE INTO citations (
                    id, report_id, section_id, number, claim_text, evidence_id,
                    quote, context, confidence, weak_anchor
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    c.id.to_string(),
                    c.report_id.to_string(),
                    c.section_id.to_string(),
                    c.number,
                    c.claim_text,
                    c.evidence_id.to_string(),
                    c.quote,
                    c.context,
                    c.confidence,
                    c.weak_anchor as i64,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn get_citations_for_report(&self, report_id: Uuid) -> Result<Vec<Citation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM citations WHERE report_id = ?1 ORDER BY number ASC",
        )?;
        let rows = stmt
            .query_map(params![report_id.to_string()], |row| {
                let id: String = row.get("id")?;
                let section_id: String = row.get("section_id")?;
                let evidence_id: String = row.get("evidence_id")?;
                Ok(Citation {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    report_id,
                    section_id: Uuid::parse_str(&section_id).unwrap_or_default(),
                    number: row.get::<_, i64>("number")? as u32,
                    claim_text: row.get("claim_text")?,
                    evidence_id: Uuid::parse_str(&evidence_id).unwrap_or_default(),
                    quote: row.get("quote")?,
                    context: row.get("context")?,
                    confidence: row.get("confidence")?,
                    weak_anchor: row.get::<_, i64>("weak_anchor")? != 0,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn row_to_report(row: Option<&rusqlite::Row>) -> Result<Option<Report>> {
    let Some(row) = row else {
        return Ok(None);
    };
    let id: String = row.get("id")?;
    let scan_id: String = row.get("scan_id")?;
    let sections_json: String = row.get("sections_json")?;
    let sections: Vec<ReportSection> = serde_json::from_str(&sections_json)?;
    Ok(Some(Report {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        scan_id: Uuid::parse_str(&scan_id).unwrap_or_default(),
        executive_summary: row.get("executive_summary")?,
        investment_score: row.get("investment_score")?,
        sections,
        aggregate_quality_score: row.get("aggregate_quality_score")?,
        evidence_count: row.get::<_, i64>("evidence_count")? as usize,
        generator_model: row.get("generator_model")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Company, ScanRequest};
    use tempfile::NamedTempFile;

    fn store() -> SqliteStore {
        let file = NamedTempFile::new().unwrap();
        SqliteStore::open(file.path().to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_scan() {
        let store = store();
        let scan = ScanRequest::new(
            Company {
                name: "Acme".into(),
                website: "https://acme.test".into(),
            },
            AnalysisDepth::Shallow,
            None,
        );
        store.upsert_scan(&scan).await.unwrap();
        let loaded = store.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.company.name, "Acme");
        assert_eq!(loaded.status, ScanStatus::Pending);
    }

    #[tokio::test]
    async fn evidence_batch_insert_dedups_on_conflict() {
        let store = store();
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
        let inserted_first = store.insert_evidence_batch(&[e.clone()]).await.unwrap();
        let inserted_again = store.insert_evidence_batch(&[e]).await.unwrap();
        assert_eq!(inserted_first, 1);
        assert_eq!(inserted_again, 0);
    }
}
