//! Shared application state, handed to every axum handler via `State`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::collectors::CollectorRegistry;
use crate::orchestrator::{CancellationToken, Orchestrator};
use crate::store::Store;

/// Live cancellation tokens for scans currently being driven by the
/// orchestrator. Entries are removed once the scan reaches a terminal
/// status; a missing entry for an existing scan just means it already
/// finished, not that cancellation is unsupported.
pub type CancellationRegistry = Mutex<HashMap<Uuid, CancellationToken>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<CollectorRegistry>,
    pub cancellations: Arc<CancellationRegistry>,
}
