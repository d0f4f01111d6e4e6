//! Exponential backoff with jitter, modeled on the binance session manager's
//! `BackoffCalculator`: thundering-herd prevention via a fast xorshift PRNG
//! rather than a full `rand` dependency.

use std::time::Duration;

use crate::config::Tunables;

#[derive(Debug)]
pub struct BackoffCalculator {
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
    attempt: u32,
    rng_state: u64,
}

impl BackoffCalculator {
    pub fn new(tunables: &Tunables) -> Self {
        Self {
            base_ms: tunables.retry_initial_delay_ms,
            max_ms: tunables.retry_max_delay_ms,
            multiplier: tunables.backoff_factor,
            jitter_factor: 0.3,
            attempt: 0,
            rng_state: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E3779B97F4A7C15)
                | 1,
        }
    }

    #[cfg(test)]
    pub fn with_params(base_ms: u64, max_ms: u64, multiplier: f64, jitter_factor: f64) -> Self {
        Self {
            base_ms,
            max_ms,
            multiplier,
            jitter_factor,
            attempt: 0,
            rng_state: 0x9E3779B97F4A7C15,
        }
    }

    #[inline]
    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f64) / (u64::MAX as f64)
    }

    /// Computes the next backoff duration and advances the attempt counter.
    pub fn next_backoff(&mut self) -> Duration {
        let base = (self.base_ms as f64) * self.multiplier.powi(self.attempt as i32);
        let capped = base.min(self.max_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = (self.next_random() * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped + jitter).max(self.base_ms as f64);

        self.attempt += 1;
        Duration::from_millis(final_ms as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let mut b = BackoffCalculator::with_params(100, 1_000, 2.0, 0.0);
        let first = b.next_backoff().as_millis();
        let second = b.next_backoff().as_millis();
        assert_eq!(first, 100);
        assert_eq!(second, 200);
        for _ in 0..10 {
            b.next_backoff();
        }
        assert!(b.next_backoff().as_millis() <= 1_000);
    }

    #[test]
    fn reset_restarts_attempt_counter() {
        let mut b = BackoffCalculator::with_params(50, 5_000, 2.0, 0.0);
        b.next_backoff();
        b.next_backoff();
        assert_eq!(b.attempt(), 2);
        b.reset();
        assert_eq!(b.attempt(), 0);
    }
}
