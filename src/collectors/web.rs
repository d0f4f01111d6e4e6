//! Thin HTTP-based collectors: deterministic stand-ins sufficient to
//! exercise the pipeline end-to-end (spec §4.1 ambient note). Grounded on
//! `scrapers/dome_tracker.rs`'s `reqwest::Client` construction and
//! `vault/llm.rs`'s request/response handling idiom.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Capability, Evidence, EvidenceContent, EvidenceMetadata, EvidenceType, SourceDescriptor,
};
use crate::error::CollectorError;

use super::{CollectInput, CollectOutput, Collector};

/// Fetches the company's homepage and records it as raw web-page evidence
/// plus a best-effort technology fingerprint derived from response headers.
pub struct WebProbeCollector {
    http: reqwest::Client,
}

impl WebProbeCollector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub(crate) fn classify_http_error(err: &reqwest::Error) -> CollectorError {
        if err.is_timeout() {
            CollectorError::Timeout(Duration::from_secs(10))
        } else if err.is_connect() || err.is_request() {
            CollectorError::TransientNetwork(err.to_string())
        } else {
            CollectorError::UpstreamMalformed(err.to_string())
        }
    }
}

#[async_trait]
impl Collector for WebProbeCollector {
    fn name(&self) -> &str {
        "web-probe"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Web, Capability::Tech]
    }

    fn cost(&self) -> u32 {
        1
    }

    fn suggested_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn max_concurrency(&self) -> usize {
        8
    }

    async fn collect(&self, input: &CollectInput) -> CollectOutput {
        if input.company_website.trim().is_empty() {
            return CollectOutput::failed(CollectorError::InvalidInput("empty website".into()));
        }

        let response = match self.http.get(&input.company_website).send().await {
            Ok(resp) => resp,
            Err(err) => return CollectOutput::failed(Self::classify_http_error(&err)),
        };

        let status = response.status();
        if !status.is_success() {
            return CollectOutput::failed(CollectorError::UpstreamMalformed(format!(
                "homepage fetch returned {status}"
            )));
        }

        let server_header = response
            .headers()
            .get(reqwest::header::SERVER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return CollectOutput::failed(Self::classify_http_error(&err)),
        };

        let summary: String = body.chars().take(2_000).collect();
        let source = SourceDescriptor {
            kind: "web".into(),
            url_or_query: input.company_website.clone(),
            timestamp: Utc::now(),
        };

        let mut evidence = vec![Evidence::new(
            input.scan_id,
            "technology",
            EvidenceType::WebPage,
            source.clone(),
            EvidenceContent { raw: body, processed_summary: summary, title: None },
            EvidenceMetadata { confidence: 0.6, relevance: 0.5, ..EvidenceMetadata::default() },
        )];

        if let Some(server) = server_header {
            evidence.push(Evidence::new(
                input.scan_id,
                "technology",
                EvidenceType::TechStack,
                source,
                EvidenceContent {
                    raw: server.clone(),
                    processed_summary: format!("Server header: {server}"),
                    title: Some("Server header".into()),
                },
                EvidenceMetadata { confidence: 0.7, relevance: 0.6, ..EvidenceMetadata::default() },
            ));
        }

        CollectOutput::ok(evidence)
    }
}

/// Issues a handful of canned search-style queries against a generic search
/// backend; stands in for a real search-engine collector.
pub struct SearchProbeCollector {
    http: reqwest::Client,
    endpoint: String,
}

impl SearchProbeCollector {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl Collector for SearchProbeCollector {
    fn name(&self) -> &str {
        "search-probe"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Web, Capability::Market]
    }

    fn cost(&self) -> u32 {
        2
    }

    fn suggested_timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    fn max_concurrency(&self) -> usize {
        4
    }

    async fn collect(&self, input: &CollectInput) -> CollectOutput {
        let query = format!("{} company overview", input.company_name);
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query.as_str())])
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(err) => return CollectOutput::failed(WebProbeCollector::classify_http_error(&err)),
        };

        if !response.status().is_success() {
            return CollectOutput::failed(CollectorError::UpstreamMalformed(format!(
                "search backend returned {}",
                response.status()
            )));
        }

        let body = response.text().await.unwrap_or_default();
        let summary: String = body.chars().take(1_000).collect();

        let evidence = vec![Evidence::new(
            input.scan_id,
            "market",
            EvidenceType::SearchResult,
            SourceDescriptor { kind: "web-search".into(), url_or_query: query, timestamp: Utc::now() },
            EvidenceContent { raw: body, processed_summary: summary, title: None },
            EvidenceMetadata { confidence: 0.5, relevance: 0.5, ..EvidenceMetadata::default() },
        )];

        CollectOutput::ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn web_probe_rejects_empty_website() {
        let collector = WebProbeCollector::new(reqwest::Client::new());
        let input = CollectInput {
            scan_id: Uuid::new_v4(),
            company_name: "Acme".into(),
            company_website: String::new(),
            options: serde_json::json!({}),
        };
        let output = collector.collect(&input).await;
        assert!(matches!(output.err, Some(CollectorError::InvalidInput(_))));
    }
}
