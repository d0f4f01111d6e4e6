//! Evidence fingerprinting and normalization (spec §4.5).
//!
//! `fp = hash(normalize(type) ‖ normalize(url|query) ‖ normalize(summary[0..N]))`

use sha2::{Digest, Sha256};

use crate::domain::{Evidence, SourceDescriptor};

/// Only the first `N` bytes of the processed summary participate in the
/// fingerprint so that minor tail differences in otherwise-identical
/// evidence don't defeat deduplication.
const SUMMARY_PREFIX_BYTES: usize = 256;

fn normalize_text(s: &str) -> String {
    s.trim().to_ascii_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_source(sources: &[SourceDescriptor]) -> String {
    sources
        .first()
        .map(|s| normalize_text(&s.url_or_query))
        .unwrap_or_default()
}

/// Computes the dedup fingerprint for a piece of evidence.
pub fn fingerprint(evidence: &Evidence) -> String {
    let normalized_type = evidence.evidence_type.normalized();
    let normalized_source = normalize_source(&evidence.sources);
    let summary_prefix: String = normalize_text(&evidence.content.processed_summary)
        .chars()
        .take(SUMMARY_PREFIX_BYTES)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(normalized_type.as_bytes());
    hasher.update(b"\x01");
    hasher.update(normalized_source.as_bytes());
    hasher.update(b"\x01");
    hasher.update(summary_prefix.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvidenceContent, EvidenceMetadata, EvidenceType};
    use uuid::Uuid;

    fn evidence_with(summary: &str, url: &str) -> Evidence {
        Evidence::new(
            Uuid::new_v4(),
            "technology",
            EvidenceType::TechStack,
            SourceDescriptor {
                kind: "web".into(),
                url_or_query: url.into(),
                timestamp: chrono::Utc::now(),
            },
            EvidenceContent {
                raw: String::new(),
                processed_summary: summary.into(),
                title: None,
            },
            EvidenceMetadata::default(),
        )
    }

    #[test]
    fn identical_evidence_has_identical_fingerprint() {
        let a = evidence_with("Uses React and Postgres", "https://acme.test/about");
        let b = evidence_with("Uses React and Postgres", "https://acme.test/about");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn case_and_whitespace_do_not_affect_fingerprint() {
        let a = evidence_with("Uses React and Postgres", "https://acme.test/about");
        let b = evidence_with("  USES   react AND   postgres ", "HTTPS://ACME.TEST/ABOUT");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_source_changes_fingerprint() {
        let a = evidence_with("Uses React", "https://acme.test/about");
        let b = evidence_with("Uses React", "https://acme.test/careers");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
