//! Evidence scoring (spec §4.5).
//!
//! `score = base_confidence * type_boost * source_boost`, clamped to `[0,1]`.

use crate::domain::{Evidence, EvidenceType};

const HIGH_VALUE_TYPE_BOOST: f64 = 1.5;
const BASE_TYPE_BOOST: f64 = 1.0;
const GENERIC_WEB_SEARCH_SOURCE_BOOST: f64 = 0.8;
const OTHER_SOURCE_BOOST: f64 = 1.0;

fn type_boost(evidence_type: &EvidenceType) -> f64 {
    if evidence_type.is_high_value() {
        HIGH_VALUE_TYPE_BOOST
    } else {
        BASE_TYPE_BOOST
    }
}

fn source_boost(evidence: &Evidence) -> f64 {
    let is_generic_web_search = evidence
        .sources
        .first()
        .map(|s| s.kind.eq_ignore_ascii_case("web-search") || s.kind.eq_ignore_ascii_case("search"))
        .unwrap_or(false);

    if is_generic_web_search {
        GENERIC_WEB_SEARCH_SOURCE_BOOST
    } else {
        OTHER_SOURCE_BOOST
    }
}

/// Computes the evidence score, clamped to `[0, 1]`.
pub fn score(evidence: &Evidence) -> f64 {
    let raw = evidence.metadata.confidence * type_boost(&evidence.evidence_type) * source_boost(evidence);
    raw.clamp(0.0, 1.0)
}
