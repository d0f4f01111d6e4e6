//! Per-collector circuit breaker (spec §5 "Resilience Layer").
//!
//! Three states — closed, open, half-open — modeled on the binance session
//! manager's `EndpointRotator`: `breaker_threshold` consecutive failures
//! opens the circuit for `breaker_cooldown`, doubling on each repeat open up
//! to a cap, and a single probe call is allowed through on expiry.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Tunables;

const COOLDOWN_DOUBLING_CAP_MULTIPLIER: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    base_cooldown: Duration,
    consecutive_failures: u32,
    consecutive_opens: u32,
    open_until: Option<Instant>,
    half_open: bool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, tunables: &Tunables) -> Self {
        Self {
            name: name.into(),
            threshold: tunables.breaker_threshold,
            base_cooldown: tunables.breaker_cooldown(),
            consecutive_failures: 0,
            consecutive_opens: 0,
            open_until: None,
            half_open: false,
        }
    }

    /// Returns whether a call may proceed. Transitions `Open` → `HalfOpen`
    /// once the cooldown elapses, allowing exactly one probe through.
    pub fn allow(&mut self, clock: &dyn Clock) -> CircuitState {
        let Some(open_until) = self.open_until else {
            return CircuitState::Closed;
        };

        if clock.now() >= open_until {
            if !self.half_open {
                self.half_open = true;
                debug!(collector = %self.name, "circuit half-open, allowing probe");
                return CircuitState::HalfOpen;
            }
            // A probe is already outstanding; keep the circuit open for
            // everyone else until it resolves via record_success/record_failure.
            return CircuitState::Open;
        }

        CircuitState::Open
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 || self.open_until.is_some() {
            debug!(collector = %self.name, "circuit recovered");
        }
        self.consecutive_failures = 0;
        self.consecutive_opens = 0;
        self.open_until = None;
        self.half_open = false;
    }

    pub fn record_failure(&mut self, clock: &dyn Clock) {
        self.consecutive_failures += 1;
        self.half_open = false;

        if self.consecutive_failures >= self.threshold {
            let multiplier = 2u32.saturating_pow(self.consecutive_opens).min(COOLDOWN_DOUBLING_CAP_MULTIPLIER);
            let cooldown = self.base_cooldown * multiplier;
            self.open_until = Some(clock.now() + cooldown);
            self.consecutive_opens += 1;
            warn!(
                collector = %self.name,
                failures = self.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "circuit opened"
            );
        }
    }

    pub fn is_open(&self, clock: &dyn Clock) -> bool {
        matches!(
            self.open_until,
            Some(until) if clock.now() < until && !self.half_open
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn tunables() -> Tunables {
        let mut t = Tunables::default();
        t.breaker_threshold = 3;
        t.breaker_cooldown_secs = 10;
        t
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let clock = FakeClock::new();
        let mut cb = CircuitBreaker::new("web", &tunables());
        for _ in 0..2 {
            cb.record_failure(&*clock);
            assert!(!cb.is_open(&*clock));
        }
        cb.record_failure(&*clock);
        assert!(cb.is_open(&*clock));
    }

    #[test]
    fn half_opens_after_cooldown_and_allows_one_probe() {
        let clock = FakeClock::new();
        let mut cb = CircuitBreaker::new("web", &tunables());
        for _ in 0..3 {
            cb.record_failure(&*clock);
        }
        assert!(cb.is_open(&*clock));
        clock.advance(Duration::from_secs(11));
        assert_eq!(cb.allow(&*clock), CircuitState::HalfOpen);
    }

    #[test]
    fn success_resets_breaker() {
        let clock = FakeClock::new();
        let mut cb = CircuitBreaker::new("web", &tunables());
        for _ in 0..3 {
            cb.record_failure(&*clock);
        }
        cb.record_success();
        assert!(!cb.is_open(&*clock));
        cb.record_failure(&*clock);
        assert!(!cb.is_open(&*clock));
    }
}
