//! `Evidence` and `EvidenceCollection` — the heterogeneous payloads collectors
//! produce and the Pool deduplicates, scores, and persists.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Capability tags a collector advertises and evidence carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Web,
    Tech,
    Security,
    Market,
    Financial,
    Team,
    Vulnerability,
    Tls,
    Performance,
    DeepResearch,
}

/// High-value evidence types get a scoring boost (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceType {
    TechStack,
    FinancialMetric,
    TeamInfo,
    Security,
    ApiEndpoint,
    Customer,
    WebPage,
    SearchResult,
    Other(String),
}

impl EvidenceType {
    pub fn is_high_value(&self) -> bool {
        matches!(
            self,
            EvidenceType::TechStack
                | EvidenceType::FinancialMetric
                | EvidenceType::TeamInfo
                | EvidenceType::Security
                | EvidenceType::ApiEndpoint
                | EvidenceType::Customer
        )
    }

    /// Stable normalized label used in fingerprint computation.
    pub fn normalized(&self) -> String {
        match self {
            EvidenceType::Other(s) => s.trim().to_ascii_lowercase(),
            other => format!("{other:?}").to_ascii_lowercase(),
        }
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: String,
    pub url_or_query: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceContent {
    pub raw: String,
    pub processed_summary: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    pub confidence: f64,
    pub relevance: f64,
    pub tokens: Option<u32>,
    /// Ordered trail of extraction/processing steps, merged on dedup.
    pub extraction_trail: Vec<String>,
    pub fallback: bool,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl Default for EvidenceMetadata {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            relevance: 0.5,
            tokens: None,
            extraction_trail: Vec::new(),
            fallback: false,
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub scan_id: Uuid,
    /// Pillar id (if bound to a thesis pillar) or a free-form category tag.
    pub pillar_tag: String,
    pub evidence_type: EvidenceType,
    /// One or more source descriptors; merged when duplicates are coalesced.
    pub sources: Vec<SourceDescriptor>,
    pub content: EvidenceContent,
    pub metadata: EvidenceMetadata,
    pub embedding: Option<Vec<f32>>,
    pub fingerprint: String,
    /// Populated by the Pool's scoring step; `None` until scored.
    pub score: Option<f64>,
}

impl Evidence {
    pub fn new(
        scan_id: Uuid,
        pillar_tag: impl Into<String>,
        evidence_type: EvidenceType,
        source: SourceDescriptor,
        content: EvidenceContent,
        metadata: EvidenceMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id,
            pillar_tag: pillar_tag.into(),
            evidence_type,
            sources: vec![source],
            content,
            metadata,
            embedding: None,
            fingerprint: String::new(),
            score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCollectionStatus {
    Collecting,
    Partial,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceCollection {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub status: EvidenceCollectionStatus,
    pub count: usize,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl EvidenceCollection {
    pub fn new(scan_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id,
            status: EvidenceCollectionStatus::Collecting,
            count: 0,
            metadata: HashMap::new(),
        }
    }
}

/// Per-pillar quality summary (spec §4.5 "Quality summary").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarQualitySummary {
    pub pillar_tag: String,
    pub count: usize,
    pub average_score: f64,
    pub above_threshold_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_value_types_flagged_correctly() {
        assert!(EvidenceType::TechStack.is_high_value());
        assert!(!EvidenceType::WebPage.is_high_value());
    }
}
