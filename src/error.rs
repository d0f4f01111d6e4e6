//! Error taxonomy for the collection pipeline.
//!
//! Distinguishes retriable from non-retriable failures so the resilience
//! layer and orchestrator can make propagation decisions without string
//! matching. Composition boundaries (HTTP handlers, `main`, store setup)
//! still use `anyhow::Result` the way the rest of the codebase does.

use std::time::Duration;

use thiserror::Error;

/// A classified failure from a collector invocation or downstream stage.
///
/// Kinds mirror the taxonomy in the design notes: retriable network/timeout
/// failures accumulate toward circuit-breaker and retry budgets, while
/// `AuthFailure`, `InvalidInput`, and `Canceled` bypass retry entirely.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("rate limited{}", .retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream returned malformed data: {0}")]
    UpstreamMalformed(String),

    #[error("canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("circuit open for {collector}")]
    CircuitOpen { collector: String },
}

impl CollectorError {
    /// Whether the resilience layer should reattempt this failure at all.
    ///
    /// `CircuitOpen` is deliberately excluded: a breaker trip already means
    /// "do not attempt", so retrying it would defeat the breaker.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CollectorError::TransientNetwork(_)
                | CollectorError::RateLimited { .. }
                | CollectorError::Timeout(_)
        )
    }

    /// Internal errors get exactly one extra attempt before becoming fatal;
    /// everything else follows `is_retriable`.
    pub fn retries_remaining_after(&self, attempt: u32, max_retries: u32) -> bool {
        match self {
            CollectorError::Internal(_) => attempt < 1,
            other if other.is_retriable() => attempt < max_retries,
            _ => false,
        }
    }

    /// Whether this failure should count toward circuit-breaker accounting.
    pub fn counts_toward_breaker(&self) -> bool {
        !matches!(self, CollectorError::Canceled | CollectorError::CircuitOpen { .. })
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            CollectorError::TransientNetwork(_) => "transient_network",
            CollectorError::RateLimited { .. } => "rate_limited",
            CollectorError::Timeout(_) => "timeout",
            CollectorError::AuthFailure(_) => "auth_failure",
            CollectorError::InvalidInput(_) => "invalid_input",
            CollectorError::UpstreamMalformed(_) => "upstream_malformed",
            CollectorError::Canceled => "canceled",
            CollectorError::Internal(_) => "internal",
            CollectorError::CircuitOpen { .. } => "circuit_open",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_network_is_retriable() {
        assert!(CollectorError::TransientNetwork("boom".into()).is_retriable());
    }

    #[test]
    fn auth_failure_is_not_retriable() {
        assert!(!CollectorError::AuthFailure("bad key".into()).is_retriable());
    }

    #[test]
    fn canceled_does_not_count_toward_breaker() {
        assert!(!CollectorError::Canceled.counts_toward_breaker());
    }

    #[test]
    fn internal_gets_exactly_one_retry() {
        let e = CollectorError::Internal("oops".into());
        assert!(e.retries_remaining_after(0, 3));
        assert!(!e.retries_remaining_after(1, 3));
    }
}
