//! SQLite schema for [`super::sqlite::SqliteStore`].
//!
//! Mirrors the teacher's WAL-mode pragma block and covering-index style
//! (`signals/db_storage.rs`), scaled down to this service's much smaller
//! per-scan row counts.

pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS scans (
    id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    company_website TEXT NOT NULL,
    investor_profile TEXT,
    analysis_depth TEXT NOT NULL,
    thesis_id TEXT,
    status TEXT NOT NULL,
    status_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_scans_status
    ON scans(status, updated_at DESC);

CREATE TABLE IF NOT EXISTS evidence_collections (
    id TEXT PRIMARY KEY,
    scan_id TEXT NOT NULL,
    status TEXT NOT NULL,
    count INTEGER NOT NULL,
    metadata_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_evidence_collections_scan
    ON evidence_collections(scan_id);

CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY,
    scan_id TEXT NOT NULL,
    pillar_tag TEXT NOT NULL,
    evidence_type TEXT NOT NULL,
    sources_json TEXT NOT NULL,
    content_json TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    embedding_json TEXT,
    fingerprint TEXT NOT NULL,
    score REAL,
    UNIQUE(scan_id, fingerprint)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_evidence_scan
    ON evidence(scan_id, score DESC);

CREATE TABLE IF NOT EXISTS stage_results (
    scan_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    retries INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    evidence_count INTEGER NOT NULL,
    error TEXT,
    recorded_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (scan_id, stage)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS reports (
    id TEXT PRIMARY KEY,
    scan_id TEXT NOT NULL UNIQUE,
    executive_summary TEXT NOT NULL,
    investment_score REAL NOT NULL,
    sections_json TEXT NOT NULL,
    aggregate_quality_score REAL NOT NULL,
    evidence_count INTEGER NOT NULL,
    generator_model TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS citations (
    id TEXT PRIMARY KEY,
    report_id TEXT NOT NULL,
    section_id TEXT NOT NULL,
    number INTEGER NOT NULL,
    claim_text TEXT NOT NULL,
    evidence_id TEXT NOT NULL,
    quote TEXT NOT NULL,
    context TEXT NOT NULL,
    confidence REAL NOT NULL,
    weak_anchor INTEGER NOT NULL,
    UNIQUE(report_id, number)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_citations_report
    ON citations(report_id, number);
"#;
