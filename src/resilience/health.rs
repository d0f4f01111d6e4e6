//! Health Monitor (spec §5 "Health Monitor").
//!
//! Tracks a rolling success/failure count per collector and classifies it
//! into healthy/degraded/critical bands, the way the binance session
//! manager's `HeartbeatMonitor` classifies connection health from
//! consecutive stale-data checks rather than instantaneous state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBand {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Default)]
struct CollectorCounters {
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Window-free health classification: looks at the failure ratio over the
/// lifetime of the process for a given collector. Good enough for a
/// per-scan-lived process; a long-running daemon would want a sliding
/// window instead.
pub struct HealthMonitor {
    degraded_ratio: f64,
    critical_ratio: f64,
    min_samples: u64,
    counters: RwLock<HashMap<String, CollectorCounters>>,
}

impl HealthMonitor {
    pub fn new(degraded_ratio: f64, critical_ratio: f64, min_samples: u64) -> Self {
        Self {
            degraded_ratio,
            critical_ratio,
            min_samples,
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, collector: &str) {
        if let Some(counters) = self.counters.read().get(collector) {
            counters.successes.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(collector.to_string())
            .or_default()
            .successes
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, collector: &str) {
        if let Some(counters) = self.counters.read().get(collector) {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(collector.to_string())
            .or_default()
            .failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn band(&self, collector: &str) -> HealthBand {
        let guard = self.counters.read();
        let Some(counters) = guard.get(collector) else {
            return HealthBand::Healthy;
        };
        let successes = counters.successes.load(Ordering::Relaxed);
        let failures = counters.failures.load(Ordering::Relaxed);
        let total = successes + failures;
        if total < self.min_samples {
            return HealthBand::Healthy;
        }
        let failure_ratio = failures as f64 / total as f64;
        if failure_ratio >= self.critical_ratio {
            HealthBand::Critical
        } else if failure_ratio >= self.degraded_ratio {
            HealthBand::Degraded
        } else {
            HealthBand::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_healthy_below_min_samples() {
        let monitor = HealthMonitor::new(0.3, 0.6, 10);
        for _ in 0..5 {
            monitor.record_failure("web");
        }
        assert_eq!(monitor.band("web"), HealthBand::Healthy);
    }

    #[test]
    fn classifies_degraded_and_critical() {
        let monitor = HealthMonitor::new(0.3, 0.6, 10);
        for _ in 0..4 {
            monitor.record_failure("web");
        }
        for _ in 0..6 {
            monitor.record_success("web");
        }
        assert_eq!(monitor.band("web"), HealthBand::Degraded);

        for _ in 0..10 {
            monitor.record_failure("web");
        }
        assert_eq!(monitor.band("web"), HealthBand::Critical);
    }
}
