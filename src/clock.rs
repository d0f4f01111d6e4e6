//! Injectable clock source.
//!
//! Retry backoff, circuit-breaker cooldowns, and scan deadlines all read
//! "now" through this trait instead of `Instant::now()`/`Utc::now()`
//! directly, so tests can advance time deterministically rather than
//! sleeping real wall-clock seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn utc_now(&self) -> DateTime<Utc>;

    /// Waits out `duration`. Retry backoff and any other delay logic should
    /// call this instead of `tokio::time::sleep` directly, so a `FakeClock`
    /// can make the wait instantaneous in tests.
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock time. Used everywhere outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// `now()` returns a fixed base `Instant` offset by however many
/// milliseconds have been added via [`FakeClock::advance`].
pub struct FakeClock {
    base: Instant,
    base_utc: DateTime<Utc>,
    offset_ms: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            base_utc: Utc::now(),
            offset_ms: AtomicU64::new(0),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.base_utc + chrono::Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst) as i64)
    }

    /// Advances logical time instead of actually waiting, so tests exercise
    /// retry/backoff loops without sleeping real milliseconds.
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_secs(5));
    }
}
