//! Process-wide resilience state: one `CircuitBreaker` per collector name
//! plus the shared `HealthMonitor`, the two pieces of "global mutable state"
//! spec §5 permits outside the Collector Registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::config::Tunables;

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::health::HealthMonitor;

pub struct ResilienceRegistry {
    breakers: RwLock<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
    tunables: Tunables,
    pub health: HealthMonitor,
}

impl ResilienceRegistry {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            health: HealthMonitor::new(0.3, 0.6, 5),
            tunables,
        }
    }

    fn breaker_for(&self, collector: &str) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(breaker) = self.breakers.read().get(collector) {
            return breaker.clone();
        }
        self.breakers
            .write()
            .entry(collector.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CircuitBreaker::new(collector, &self.tunables))))
            .clone()
    }

    pub fn is_open(&self, collector: &str, clock: &dyn Clock) -> bool {
        self.breaker_for(collector).lock().is_open(clock)
    }

    pub fn allow(&self, collector: &str, clock: &dyn Clock) -> CircuitState {
        self.breaker_for(collector).lock().allow(clock)
    }

    pub fn record_success(&self, collector: &str) {
        self.breaker_for(collector).lock().record_success();
        self.health.record_success(collector);
    }

    pub fn record_failure(&self, collector: &str, clock: &dyn Clock) {
        self.breaker_for(collector).lock().record_failure(clock);
        self.health.record_failure(collector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn opens_independently_per_collector() {
        let mut tunables = Tunables::default();
        tunables.breaker_threshold = 2;
        let registry = ResilienceRegistry::new(tunables);
        let clock = FakeClock::new();

        registry.record_failure("web", &*clock);
        registry.record_failure("web", &*clock);
        assert!(registry.is_open("web", &*clock));
        assert!(!registry.is_open("search", &*clock));
    }
}
