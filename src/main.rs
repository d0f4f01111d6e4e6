//! `diligenced` — HTTP entry point for the due-diligence evidence pipeline.
//!
//! Wires the library crate's collectors, store, and orchestrator into one
//! `AppState` and serves the spec §6 HTTP surface with axum.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diligence_core::api::{self, AppState};
use diligence_core::clock::SystemClock;
use diligence_core::collectors::heuristic::HeuristicFallbackCollector;
use diligence_core::collectors::security::SecurityHeaderCollector;
use diligence_core::collectors::web::{SearchProbeCollector, WebProbeCollector};
use diligence_core::collectors::CollectorRegistry;
use diligence_core::config::{Cli, Config};
use diligence_core::orchestrator::Orchestrator;
use diligence_core::store::sqlite::SqliteStore;
use diligence_core::synthesizer::{DeterministicAnalyzer, OpenRouterAnalyzer, Synthesizer};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diligence_core=debug,diligenced=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Registers the collectors this deployment ships with, highest-priority
/// first within each capability (spec §4.1: "Registry, populated at
/// startup, read-only afterward").
fn build_collector_registry(http: reqwest::Client, config: &Config) -> Arc<CollectorRegistry> {
    let registry = Arc::new(CollectorRegistry::new());

    registry.register(Arc::new(WebProbeCollector::new(http.clone())), 20);
    registry.register(Arc::new(SecurityHeaderCollector::new(http.clone())), 20);
    if let Some(endpoint) = &config.search_endpoint {
        registry.register(Arc::new(SearchProbeCollector::new(http.clone(), endpoint.clone())), 10);
    }
    // Terminus of every fallback chain; never disabled (spec §4.3).
    registry.register(Arc::new(HeuristicFallbackCollector::new()), 0);

    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(&cli).context("failed to load configuration")?;

    let store = Arc::new(SqliteStore::open(&config.database_path).context("failed to open database")?);
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build http client")?;

    let registry = build_collector_registry(http.clone(), &config);

    let clock = Arc::new(SystemClock);
    let synthesizer: Arc<dyn diligence_core::synthesizer::ReportGenerator> = match &config.openrouter_api_key {
        Some(api_key) => Arc::new(Synthesizer::new(
            Arc::new(OpenRouterAnalyzer::new(http.clone(), api_key.clone(), "anthropic/claude-3.5-sonnet".to_string())),
            clock.clone(),
            config.tunables.clone(),
            "anthropic/claude-3.5-sonnet",
        )),
        None => {
            tracing::warn!("OPENROUTER_API_KEY not set, falling back to the deterministic analyzer");
            Arc::new(Synthesizer::new(Arc::new(DeterministicAnalyzer), clock.clone(), config.tunables.clone(), "offline-deterministic"))
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        registry.clone(),
        synthesizer,
        clock,
        config.tunables.clone(),
    ));

    let state = AppState {
        store,
        orchestrator,
        registry,
        cancellations: Arc::new(parking_lot::Mutex::new(std::collections::HashMap::new())),
    };

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "diligenced listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}
