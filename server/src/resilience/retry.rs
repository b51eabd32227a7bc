//! Bounded retries with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use super::{Fault, FaultKind};

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff before the first retry.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Retry policy for a fallible async operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_backoff: Duration,
    /// Fault kinds worth retrying
    pub retryable: Vec<FaultKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            retryable: FaultKind::TRANSIENT.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            ..Self::default()
        }
    }

    /// Replace the set of retryable fault kinds.
    pub fn with_retryable(mut self, retryable: impl Into<Vec<FaultKind>>) -> Self {
        self.retryable = retryable.into();
        self
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1_u32 << exponent)
    }

    /// A breaker-open rejection is never retried, whatever the policy says;
    /// retrying would only burn the cool-down.
    fn should_retry(&self, kind: FaultKind) -> bool {
        kind != FaultKind::CircuitOpen && self.retryable.contains(&kind)
    }

    /// Execute `operation`, retrying retryable failures.
    ///
    /// Non-retryable failures propagate immediately; once attempts are
    /// exhausted the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Fault + Display,
    {
        let mut attempt: u32 = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !self.should_retry(e.fault_kind()) => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Retry attempts exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.backoff_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use thiserror::Error;
    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("timeout")]
        Timeout,
        #[error("rejected")]
        Rejected,
        #[error("open")]
        Open,
    }

    impl Fault for TestError {
        fn fault_kind(&self) -> FaultKind {
            match self {
                Self::Timeout => FaultKind::Timeout,
                Self::Rejected => FaultKind::Rejected,
                Self::Open => FaultKind::CircuitOpen,
            }
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt_after_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(TestError::Timeout)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Timeout)
            })
            .await;

        assert!(matches!(result, Err(TestError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = policy
            .run("bad", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Rejected)
            })
            .await;

        assert!(matches!(result, Err(TestError::Rejected)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_open_is_terminal_even_if_listed() {
        let policy = RetryPolicy::default().with_retryable([FaultKind::CircuitOpen]);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("open", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Open)
            })
            .await;

        assert!(matches!(result, Err(TestError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
