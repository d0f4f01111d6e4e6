//! Header-based TLS/security probe: a deterministic stand-in for a real
//! TLS scanner or vulnerability probe (spec §4.1 ambient note). Inspects
//! response headers reqwest already exposes rather than performing its own
//! handshake inspection.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Capability, Evidence, EvidenceContent, EvidenceMetadata, EvidenceType, SourceDescriptor,
};
use crate::error::CollectorError;

use super::web::WebProbeCollector;
use super::{CollectInput, CollectOutput, Collector};

const SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
];

pub struct SecurityHeaderCollector {
    http: reqwest::Client,
}

impl SecurityHeaderCollector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Collector for SecurityHeaderCollector {
    fn name(&self) -> &str {
        "security-header-probe"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Security, Capability::Tls]
    }

    fn cost(&self) -> u32 {
        1
    }

    fn suggested_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn max_concurrency(&self) -> usize {
        6
    }

    async fn collect(&self, input: &CollectInput) -> CollectOutput {
        if !input.company_website.starts_with("https://") {
            return CollectOutput::failed(CollectorError::InvalidInput(
                "security probe requires an https website".into(),
            ));
        }

        let response = match self.http.get(&input.company_website).send().await {
            Ok(resp) => resp,
            Err(err) => return CollectOutput::failed(WebProbeCollector::classify_http_error(&err)),
        };

        let present: Vec<&str> = SECURITY_HEADERS
            .iter()
            .filter(|h| response.headers().contains_key(**h))
            .copied()
            .collect();
        let missing: Vec<&str> = SECURITY_HEADERS
            .iter()
            .filter(|h| !response.headers().contains_key(**h))
            .copied()
            .collect();

        let summary = format!(
            "present security headers: [{}]; missing: [{}]",
            present.join(", "),
            missing.join(", ")
        );
        let confidence = 0.5 + 0.5 * (present.len() as f64 / SECURITY_HEADERS.len() as f64);

        let evidence = Evidence::new(
            input.scan_id,
            "security",
            EvidenceType::Security,
            SourceDescriptor {
                kind: "header-scan".into(),
                url_or_query: input.company_website.clone(),
                timestamp: Utc::now(),
            },
            EvidenceContent { raw: summary.clone(), processed_summary: summary, title: Some("Security headers".into()) },
            EvidenceMetadata { confidence, relevance: 0.7, ..EvidenceMetadata::default() },
        );

        CollectOutput::ok(vec![evidence])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn rejects_non_https_targets() {
        let collector = SecurityHeaderCollector::new(reqwest::Client::new());
        let input = CollectInput {
            scan_id: Uuid::new_v4(),
            company_name: "Acme".into(),
            company_website: "http://acme.test".into(),
            options: serde_json::json!({}),
        };
        let output = collector.collect(&input).await;
        assert!(matches!(output.err, Some(CollectorError::InvalidInput(_))));
    }
}
