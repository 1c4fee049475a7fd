//! Backoff executor and request deadlines for provider calls.
//!
//! Retries are local to the provider adapters: no outer layer retries, so a
//! failed chat turn never produces hidden duplicate writes. The executor
//! retries transient failures only, with exponential backoff and jitter
//! (base ~2s, cap ~10s), and gives up early when the request deadline has
//! insufficient time remaining.

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};

/// Absolute point in time after which a request must not do further work.
///
/// Created once at the HTTP boundary and propagated to every downstream
/// provider call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Time left before the deadline, or `None` when already expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.checked_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_none()
    }
}

/// Classifies errors for the retry loop.
pub trait Retryable {
    /// Whether this failure may succeed on a later attempt.
    fn is_transient(&self) -> bool;
}

/// Retry parameters for transient provider failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Sleep before retry attempt `attempt` (1-based count of failures so
    /// far): exponential growth capped at `cap`, with jitter in
    /// [0.5×, 1.0×] of the computed backoff.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.cap);
        let factor = rand::thread_rng().gen_range(0.5..=1.0);
        exp.mul_f64(factor)
    }
}

/// Run `op` with the retry policy, respecting the deadline.
///
/// The operation receives the 1-based attempt number. Permanent errors and
/// deadline exhaustion return immediately; transient errors are retried
/// until attempts run out, then the last error is returned.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    deadline: Deadline,
    op: F,
) -> Result<T, E>
where
    E: Retryable,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        let result = op(attempt).await;
        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let sleep = policy.backoff(attempt);
                // No retry when the deadline cannot cover the backoff.
                match deadline.remaining() {
                    Some(left) if left > sleep => {
                        tracing::warn!(attempt, backoff_ms = sleep.as_millis() as u64, "transient provider failure, retrying");
                        tokio::time::sleep(sleep).await;
                        attempt += 1;
                    }
                    _ => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let deadline = Deadline::after(Duration::from_secs(5));
        let result = with_retry(&fast_policy(), deadline, |_| async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError::Transient)
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<i32, _> = with_retry(&fast_policy(), deadline, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Permanent)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<i32, _> = with_retry(&fast_policy(), deadline, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Transient)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn expired_deadline_stops_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10),
        };
        let deadline = Deadline::after(Duration::from_millis(10));
        let result: Result<i32, _> = with_retry(&policy, deadline, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Transient)
        })
        .await;
        assert!(result.is_err());
        // First attempt runs, but the 2s backoff exceeds the 10ms budget.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        for attempt in 1..=6 {
            let sleep = policy.backoff(attempt);
            assert!(sleep <= policy.cap);
            assert!(sleep >= policy.base / 2);
        }
    }

    #[test]
    fn deadline_reports_remaining_time() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.expired());
        assert!(deadline.remaining().unwrap() > Duration::from_secs(59));

        let past = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(past.expired());
    }
}
