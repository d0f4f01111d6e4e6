//! Application configuration.
//!
//! Single configuration surface (spec §6, §9 "Tunables"). Defaults live
//! here; values may be overridden by environment variables at startup, and
//! the CLI (`clap`) can point at a TOML file for bulk overrides used in
//! tests and deployments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

/// Process-level CLI flags. Everything else is environment/TOML driven.
#[derive(Debug, Parser)]
#[command(name = "diligenced", about = "Technical due-diligence evidence pipeline")]
pub struct Cli {
    /// Path to a TOML file overriding the tunables below.
    #[arg(long, env = "DILIGENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP bind port.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// SQLite database path.
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<String>,
}

/// Tunables from spec §9, with their documented defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub backoff_factor: f64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
    pub stage_timeout_secs: u64,
    pub scan_deadline_secs: u64,
    pub min_evidence_for_deep_crawl: usize,
    pub quality_threshold: f64,
    pub continue_on_error: bool,
    pub citation_near_proximity_chars: usize,
    pub evidence_batch_size: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_initial_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
            backoff_factor: 2.0,
            breaker_threshold: 5,
            breaker_cooldown_secs: 30,
            stage_timeout_secs: 120,
            scan_deadline_secs: 2 * 60 * 60,
            min_evidence_for_deep_crawl: 10,
            quality_threshold: 0.7,
            continue_on_error: true,
            citation_near_proximity_chars: 50,
            evidence_batch_size: 50,
        }
    }
}

impl Tunables {
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub tunables: Tunables,
    pub openrouter_api_key: Option<String>,
    pub search_endpoint: Option<String>,
}

impl Config {
    /// Loads `.env`, applies CLI overrides on top, and returns a resolved config.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut tunables = Tunables::default();
        if let Some(path) = &cli.config {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config file {path:?}: {e}"))?;
            tunables = toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("failed to parse config file {path:?}: {e}"))?;
        }

        let database_path = cli
            .database_path
            .clone()
            .or_else(|| std::env::var("DATABASE_PATH").ok())
            .unwrap_or_else(|| "./diligence.db".to_string());

        let port = cli
            .port
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(8080);

        let openrouter_api_key = std::env::var("OPENROUTER_API_KEY").ok();
        let search_endpoint = std::env::var("SEARCH_ENDPOINT").ok();

        Ok(Self {
            database_path,
            port,
            tunables,
            openrouter_api_key,
            search_endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tunables_match_spec_defaults() {
        let t = Tunables::default();
        assert_eq!(t.max_retries, 3);
        assert_eq!(t.breaker_threshold, 5);
        assert!((t.quality_threshold - 0.7).abs() < 1e-9);
        assert_eq!(t.evidence_batch_size, 50);
    }

    #[test]
    fn toml_override_parses_partial_table() {
        let parsed: Tunables = toml::from_str("max_retries = 7\n").unwrap();
        assert_eq!(parsed.max_retries, 7);
        assert_eq!(parsed.breaker_threshold, 5); // untouched default
    }
}
