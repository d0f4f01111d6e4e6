//! The `Analyzer` adapter (spec §4.6 step 2): a model-agnostic seam between
//! the Synthesizer and whatever actually turns evidence into prose.
//!
//! Grounded on the teacher's `OpenRouterClient::chat_completion` — same
//! request shape (system/user messages, temperature, max_tokens, a hard
//! per-call timeout) and the same "parse or bail with context" error style —
//! generalized from a single completion string to a structured section
//! result the Synthesizer can bind citations against.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Evidence;
use crate::error::CollectorError;

#[derive(Clone, Copy)]
pub struct SectionAnalysisRequest<'a> {
    pub company_name: &'a str,
    pub pillar_name: &'a str,
    pub pillar_questions: &'a [String],
    pub evidence: &'a [Evidence],
}

#[derive(Debug, Clone)]
pub struct AnalyzedFinding {
    pub claim: String,
    pub supporting_evidence_ids: Vec<Uuid>,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct SectionAnalysisOutput {
    pub summary: String,
    pub findings: Vec<AnalyzedFinding>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub recommendations: Vec<String>,
    /// Confidence-weighted aggregate, `[0, 100]` (spec §4.6 "section score
    /// semantics" — not a simple evidence recount).
    pub score: f64,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze_section(&self, request: &SectionAnalysisRequest<'_>) -> Result<SectionAnalysisOutput, CollectorError>;
}

/// HTTP-backed analyzer talking to an OpenRouter-compatible chat-completions
/// endpoint. Expects the model to return a JSON object matching
/// [`RawAnalysis`]; a response that doesn't parse is an `UpstreamMalformed`
/// failure (non-retriable for the attempt, per spec §7), letting the
/// Synthesizer's retry-then-degrade policy take over.
pub struct OpenRouterAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterAnalyzer {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { http, api_key: api_key.into(), model: model.into() }
    }

    fn build_prompt(request: &SectionAnalysisRequest<'_>) -> (String, String) {
        let system = "You are a technical due-diligence analyst. Respond with a single JSON \
object matching {summary, findings: [{claim, evidence_ids, confidence}], risks, \
opportunities, recommendations, score}. score is 0-100."
            .to_string();

        let evidence_block = request
            .evidence
            .iter()
            .map(|e| format!("- [{}] {}", e.id, e.content.processed_summary))
            .collect::<Vec<_>>()
            .join("\n");

        let user = format!(
            "Company: {}\nPillar: {}\nQuestions: {}\nEvidence:\n{}",
            request.company_name,
            request.pillar_name,
            request.pillar_questions.join("; "),
            evidence_block
        );
        (system, user)
    }
}

#[async_trait]
impl Analyzer for OpenRouterAnalyzer {
    async fn analyze_section(&self, request: &SectionAnalysisRequest<'_>) -> Result<SectionAnalysisOutput, CollectorError> {
        let (system, user) = Self::build_prompt(request);

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".into(), content: system },
                ChatMessage { role: "user".into(), content: user },
            ],
            temperature: Some(0.2),
            max_tokens: Some(1_500),
        };

        let response = self
            .http
            .post("https://openrouter.ai/api/v1/chat/completions")
            .timeout(Duration::from_secs(30))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CollectorError::TransientNetwork(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CollectorError::UpstreamMalformed(format!("openrouter {status}: {}", &text[..text.len().min(400)])));
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| CollectorError::UpstreamMalformed(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| CollectorError::UpstreamMalformed("empty choices".into()))?;

        let raw: RawAnalysis =
            serde_json::from_str(&content).map_err(|e| CollectorError::UpstreamMalformed(e.to_string()))?;
        Ok(raw.into())
    }
}

/// The offline, deterministic analyzer. Computes a section entirely from
/// evidence statistics, with no network dependency — used by unit and
/// integration tests so they don't need `OPENROUTER_API_KEY`.
pub struct DeterministicAnalyzer;

#[async_trait]
impl Analyzer for DeterministicAnalyzer {
    async fn analyze_section(&self, request: &SectionAnalysisRequest<'_>) -> Result<SectionAnalysisOutput, CollectorError> {
        if request.evidence.is_empty() {
            return Ok(SectionAnalysisOutput {
                summary: format!("No evidence was collected for the {} pillar.", request.pillar_name),
                findings: Vec::new(),
                risks: vec!["Insufficient evidence to assess this pillar.".into()],
                opportunities: Vec::new(),
                recommendations: vec!["Collect additional evidence before relying on this section.".into()],
                score: 0.0,
            });
        }

        let avg_confidence: f64 =
            request.evidence.iter().map(|e| e.metadata.confidence).sum::<f64>() / request.evidence.len() as f64;
        let score = (avg_confidence * 100.0).clamp(0.0, 100.0);

        let findings = request
            .evidence
            .iter()
            .take(5)
            .map(|e| AnalyzedFinding {
                claim: e.content.processed_summary.chars().take(200).collect(),
                supporting_evidence_ids: vec![e.id],
                confidence: e.metadata.confidence,
            })
            .collect();

        Ok(SectionAnalysisOutput {
            summary: format!(
                "{} evidence item(s) collected for {} with average confidence {:.2}.",
                request.evidence.len(),
                request.pillar_name,
                avg_confidence
            ),
            findings,
            risks: Vec::new(),
            opportunities: Vec::new(),
            recommendations: Vec::new(),
            score,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoiceOut>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceOut {
    message: ChatMessageOut,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageOut {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFinding {
    claim: String,
    #[serde(default)]
    evidence_ids: Vec<Uuid>,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAnalysis {
    summary: String,
    #[serde(default)]
    findings: Vec<RawFinding>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    opportunities: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    score: f64,
}

impl From<RawAnalysis> for SectionAnalysisOutput {
    fn from(raw: RawAnalysis) -> Self {
        Self {
            summary: raw.summary,
            findings: raw
                .findings
                .into_iter()
                .map(|f| AnalyzedFinding {
                    claim: f.claim,
                    supporting_evidence_ids: f.evidence_ids,
                    confidence: f.confidence,
                })
                .collect(),
            risks: raw.risks,
            opportunities: raw.opportunities,
            recommendations: raw.recommendations,
            score: raw.score.clamp(0.0, 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvidenceContent, EvidenceMetadata, EvidenceType, SourceDescriptor};

    fn sample_evidence(confidence: f64) -> Evidence {
        let mut metadata = EvidenceMetadata::default();
        metadata.confidence = confidence;
        Evidence::new(
            Uuid::new_v4(),
            "technology",
            EvidenceType::TechStack,
            SourceDescriptor { kind: "web".into(), url_or_query: "https://acme.test".into(), timestamp: chrono::Utc::now() },
            EvidenceContent { raw: String::new(), processed_summary: "Uses Rust and Postgres".into(), title: None },
            metadata,
        )
    }

    #[tokio::test]
    async fn deterministic_analyzer_scores_from_confidence() {
        let analyzer = DeterministicAnalyzer;
        let evidence = vec![sample_evidence(0.8), sample_evidence(0.6)];
        let request = SectionAnalysisRequest {
            company_name: "Acme",
            pillar_name: "technology",
            pillar_questions: &[],
            evidence: &evidence,
        };
        let output = analyzer.analyze_section(&request).await.unwrap();
        assert!((output.score - 70.0).abs() < 1e-9);
        assert_eq!(output.findings.len(), 2);
    }

    #[tokio::test]
    async fn deterministic_analyzer_flags_missing_evidence() {
        let analyzer = DeterministicAnalyzer;
        let request = SectionAnalysisRequest {
            company_name: "Acme",
            pillar_name: "security",
            pillar_questions: &[],
            evidence: &[],
        };
        let output = analyzer.analyze_section(&request).await.unwrap();
        assert_eq!(output.score, 0.0);
        assert!(!output.risks.is_empty());
    }
}
