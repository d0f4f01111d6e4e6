//! Citation binding (spec §4.6 step 5): ties each analyzed finding back to the
//! evidence it claims to be supported by, and places an inline anchor for it
//! in the section's prose.
//!
//! Three anchor strategies are tried in order, loosest last: a sentence
//! sharing most of the claim's terms, then a paragraph, then a regex built
//! from five of the claim's terms. A citation that can't be anchored at all
//! still gets recorded against the section, just flagged `weak_anchor`.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::{Citation, Evidence};

use super::analyzer::AnalyzedFinding;

const SENTENCE_OVERLAP_THRESHOLD: f64 = 0.7;
const PARAGRAPH_OVERLAP_THRESHOLD: f64 = 0.5;
const FUZZY_TERM_COUNT: usize = 5;

fn terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_ascii_lowercase())
        .filter(|w| w.len() > 2)
        .collect()
}

fn overlap_ratio(claim_terms: &[String], candidate: &str) -> f64 {
    if claim_terms.is_empty() {
        return 0.0;
    }
    let candidate_terms: Vec<String> = terms(candidate);
    let hits = claim_terms.iter().filter(|t| candidate_terms.contains(t)).count();
    hits as f64 / claim_terms.len() as f64
}

/// A matched slice of `content`. `text` is trimmed (for term-overlap
/// matching only); `start`/`end` are raw, untrimmed byte offsets into the
/// original `content`, so they remain valid insertion points even though
/// `end - start != text.len()` whenever the raw slice had leading or
/// trailing whitespace.
struct Span {
    text: String,
    start: usize,
    end: usize,
}

fn sentences(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (idx, ch) in content.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let end = idx + ch.len_utf8();
            let text = content[start..end].trim().to_string();
            if !text.is_empty() {
                spans.push(Span { text, start, end });
            }
            start = end;
        }
    }
    if start < content.len() {
        let text = content[start..].trim().to_string();
        if !text.is_empty() {
            spans.push(Span { text, start, end: content.len() });
        }
    }
    spans
}

fn paragraphs(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for block in content.split("\n\n") {
        let trimmed = block.trim();
        let end = offset + block.len();
        if !trimmed.is_empty() {
            spans.push(Span { text: trimmed.to_string(), start: offset, end });
        }
        offset = end + 2;
    }
    spans
}

/// Slides a fixed-size word window over `content` and keeps the one sharing
/// the most of the claim's first few terms, in lieu of a regex dependency
/// the rest of this crate has no other use for.
fn fuzzy_anchor(content: &str, claim_terms: &[String]) -> Option<Span> {
    let sample: Vec<&String> = claim_terms.iter().take(FUZZY_TERM_COUNT).collect();
    if sample.is_empty() {
        return None;
    }

    let words: Vec<(usize, &str)> = content
        .split_whitespace()
        .scan(0usize, |pos, word| {
            let start = content[*pos..].find(word).map(|o| *pos + o).unwrap_or(*pos);
            *pos = start + word.len();
            Some((start, word))
        })
        .collect();

    let window = sample.len() * 4;
    if words.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize, usize)> = None; // (hits, start, end)
    for start_idx in 0..words.len() {
        let end_idx = (start_idx + window).min(words.len());
        let window_text: String = words[start_idx..end_idx].iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ");
        let window_terms = terms(&window_text);
        let hits = sample.iter().filter(|t| window_terms.contains(t)).count();
        if hits > 0 && best.map(|(best_hits, ..)| hits > best_hits).unwrap_or(true) {
            let start = words[start_idx].0;
            let end = words[end_idx - 1].0 + words[end_idx - 1].1.len();
            best = Some((hits, start, end));
        }
    }

    best.map(|(_, start, end)| Span { text: content[start..end].to_string(), start, end })
}

/// Finds an anchor for `claim` within `content`, returning the matched text,
/// its raw start/end byte offsets, and whether the match was the weak fuzzy
/// fallback. `end` is the splice point a citation marker is inserted at.
fn find_anchor(content: &str, claim: &str) -> Option<(String, usize, usize, bool)> {
    let claim_terms = terms(claim);

    for sentence in sentences(content) {
        if overlap_ratio(&claim_terms, &sentence.text) >= SENTENCE_OVERLAP_THRESHOLD {
            return Some((sentence.text, sentence.start, sentence.end, false));
        }
    }
    for paragraph in paragraphs(content) {
        if overlap_ratio(&claim_terms, &paragraph.text) >= PARAGRAPH_OVERLAP_THRESHOLD {
            return Some((paragraph.text, paragraph.start, paragraph.end, false));
        }
    }
    fuzzy_anchor(content, &claim_terms).map(|span| (span.text, span.start, span.end, true))
}

/// Binds every finding's supporting evidence ids into `Citation`s, dropping
/// ids that don't resolve against `evidence_by_id` (spec's resolved open
/// question: unresolved evidence ids are silently excluded rather than
/// failing the whole section). `next_number` is shared across a report's
/// sections so citation numbering stays monotonic report-wide.
///
/// Returns the section content with a `[n](#cite-<id>)` markdown link
/// spliced in right after each citation's anchor (or appended to the end of
/// the content for a weak/unanchored citation), alongside the `Citation`
/// records themselves.
pub fn bind_citations(
    report_id: Uuid,
    section_id: Uuid,
    content: &str,
    findings: &[AnalyzedFinding],
    evidence_by_id: &HashMap<Uuid, &Evidence>,
    proximity_chars: usize,
    next_number: &mut u32,
) -> (String, Vec<Citation>) {
    let mut citations = Vec::new();
    let mut anchored_positions: Vec<usize> = Vec::new();
    let mut markers: Vec<(usize, String)> = Vec::new();

    for finding in findings {
        for evidence_id in &finding.supporting_evidence_ids {
            let Some(evidence) = evidence_by_id.get(evidence_id) else {
                continue;
            };

            let anchor = find_anchor(content, &finding.claim);
            let (quote, start, end, weak_anchor) = match anchor {
                Some((quote, start, end, weak)) => (quote, start, end, weak),
                None => (finding.claim.clone(), content.len(), content.len(), true),
            };

            if anchored_positions.iter().any(|&p| p.abs_diff(start) < proximity_chars) {
                continue;
            }
            anchored_positions.push(start);

            let number = *next_number;
            *next_number += 1;
            let citation_id = Uuid::new_v4();
            markers.push((end, format!(" [{number}](#cite-{citation_id})")));

            citations.push(Citation {
                id: citation_id,
                report_id,
                section_id,
                number,
                claim_text: finding.claim.clone(),
                evidence_id: *evidence_id,
                quote,
                context: evidence.content.processed_summary.chars().take(240).collect(),
                confidence: finding.confidence,
                weak_anchor,
            });
        }
    }

    (splice_markers(content, markers), citations)
}

/// Inserts `markers` (byte offset, marker text) into `content` in a single
/// left-to-right pass, so markers sharing an offset land in the order they
/// were pushed and earlier insertions never shift the offsets of later ones.
fn splice_markers(content: &str, mut markers: Vec<(usize, String)>) -> String {
    markers.sort_by_key(|(pos, _)| *pos);
    let mut out = String::with_capacity(content.len() + markers.len() * 12);
    let mut cursor = 0;
    for (pos, marker) in &markers {
        let pos = (*pos).min(content.len());
        out.push_str(&content[cursor..pos]);
        out.push_str(marker);
        cursor = pos;
    }
    out.push_str(&content[cursor..]);
    out
}
