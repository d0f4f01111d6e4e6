//! Collector Interface & Registry (spec §4.1).
//!
//! `Collector` is `async_trait` object-safe so heterogeneous collectors live
//! as `Arc<dyn Collector>` in the Registry, matching the teacher's pattern of
//! storing scrapers/clients behind `Arc` for cheap sharing across worker
//! tasks.

pub mod heuristic;
pub mod registry;
pub mod security;
pub mod web;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Capability, Evidence};
use crate::error::CollectorError;

pub use registry::CollectorRegistry;

#[derive(Debug, Clone)]
pub struct CollectInput {
    pub scan_id: Uuid,
    pub company_name: String,
    pub company_website: String,
    pub options: Value,
}

/// Result of a single collector invocation. `partial_ok = true` means the
/// evidence returned is usable even though `err` is also set (spec §4.1:
/// "may return partial evidence and an error").
pub struct CollectOutput {
    pub evidence: Vec<Evidence>,
    pub partial_ok: bool,
    pub err: Option<CollectorError>,
}

impl CollectOutput {
    pub fn ok(evidence: Vec<Evidence>) -> Self {
        Self { evidence, partial_ok: false, err: None }
    }

    pub fn failed(err: CollectorError) -> Self {
        Self { evidence: Vec::new(), partial_ok: false, err: Some(err) }
    }

    pub fn partial(evidence: Vec<Evidence>, err: CollectorError) -> Self {
        Self { evidence, partial_ok: true, err: Some(err) }
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> &[Capability];
    /// Nominal relative cost, used for admission/budgeting decisions.
    fn cost(&self) -> u32;
    fn suggested_timeout(&self) -> Duration;
    fn max_concurrency(&self) -> usize;

    async fn collect(&self, input: &CollectInput) -> CollectOutput;
}
