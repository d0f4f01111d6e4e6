//! Retry orchestration: wraps a fallible async operation with the
//! backoff calculator and the error taxonomy's retriability rules.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::clock::Clock;
use crate::config::Tunables;
use crate::error::CollectorError;

use super::backoff::BackoffCalculator;

/// Runs `op` until it succeeds, exhausts `max_retries`, or fails with a
/// non-retriable error. Sleeps the computed backoff between attempts through
/// the injected [`Clock`], so a `FakeClock` makes the whole loop instant
/// under test while `SystemClock` waits for real in production.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    tunables: &Tunables,
    clock: Arc<dyn Clock>,
    mut op: F,
) -> Result<T, CollectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollectorError>>,
{
    let mut backoff = BackoffCalculator::new(tunables);
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.retries_remaining_after(attempt, tunables.max_retries) {
                    warn!(label, attempt, error = %err, "retry budget exhausted");
                    return Err(err);
                }
                let delay = backoff.next_backoff();
                warn!(label, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                clock.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let tunables = Tunables {
            retry_initial_delay_ms: 1_000,
            retry_max_delay_ms: 2_000,
            max_retries: 5,
            ..Tunables::default()
        };
        let result = retry_with_backoff("test", &tunables, FakeClock::new(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CollectorError::TransientNetwork("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn non_retriable_error_fails_immediately() {
        let tunables = Tunables::default();
        let result: Result<(), CollectorError> =
            retry_with_backoff("test", &tunables, FakeClock::new(), || async {
                Err(CollectorError::AuthFailure("bad key".into()))
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn backoff_is_driven_by_the_injected_clock() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        let attempts = AtomicU32::new(0);
        let tunables = Tunables {
            retry_initial_delay_ms: 10_000,
            retry_max_delay_ms: 10_000,
            max_retries: 3,
            ..Tunables::default()
        };
        let result = retry_with_backoff("test", &tunables, clock.clone(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { if n < 1 { Err(CollectorError::TransientNetwork("boom".into())) } else { Ok(()) } }
        })
        .await;
        assert!(result.is_ok());
        assert!(clock.now() - t0 >= std::time::Duration::from_secs(10));
    }
}
