//! Circuit breaker for external dependencies.
//!
//! Tracks consecutive failures of one dependency and refuses calls while the
//! dependency is presumed down:
//! - Closed: calls pass through, monitored failures are counted
//! - Open: calls are rejected until the recovery timeout elapses
//! - Half-Open: a single trial call decides between Closed and Open

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{Fault, FaultKind};

/// Default number of consecutive failures that trips the breaker.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cool-down before a trial call is allowed.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Rejecting calls
    Open,
    /// Allowing one trial call
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive monitored failures before opening
    pub failure_threshold: u32,
    /// Time since the last failure before a trial call is allowed
    pub recovery_timeout: Duration,
    /// Fault kinds that count as failures
    pub monitored: Vec<FaultKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            monitored: FaultKind::TRANSIENT.to_vec(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            ..Self::default()
        }
    }

    fn monitors(&self, kind: FaultKind) -> bool {
        self.monitored.contains(&kind)
    }
}

/// Rejection returned while the breaker is open.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker '{name}' is open, retry in {}s", .retry_in.as_secs())]
pub struct BreakerOpen {
    /// Name of the protected dependency
    pub name: String,
    /// Remaining cool-down
    pub retry_in: Duration,
}

impl Fault for BreakerOpen {
    fn fault_kind(&self) -> FaultKind {
        FaultKind::CircuitOpen
    }
}

/// Point-in-time view of a breaker, exposed on the readiness endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Circuit breaker protecting one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state as a new caller would observe it.
    ///
    /// An open breaker whose cool-down has elapsed reads as half-open even
    /// though the transition only happens when a trial call is admitted.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        self.observed_state(&inner, Instant::now())
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.observed_state(&inner, Instant::now()),
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs(),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns `E::from(BreakerOpen)` without invoking the operation while
    /// the breaker is open, or while another caller holds the half-open trial.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Fault + From<BreakerOpen>,
    {
        let admission = self.admit().map_err(E::from)?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let result = operation().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.record_success(admission),
            Err(e) if self.config.monitors(e.fault_kind()) => self.record_failure(admission),
            Err(_) => self.record_neutral(admission),
        }

        result
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cooled_down(&self, inner: &BreakerInner, now: Instant) -> bool {
        inner
            .last_failure
            .is_none_or(|at| now.saturating_duration_since(at) >= self.config.recovery_timeout)
    }

    fn observed_state(&self, inner: &BreakerInner, now: Instant) -> CircuitState {
        match inner.state {
            CircuitState::Open if self.cooled_down(inner, now) => CircuitState::HalfOpen,
            state => state,
        }
    }

    fn remaining_cooldown(&self, inner: &BreakerInner, now: Instant) -> Duration {
        inner.last_failure.map_or(Duration::ZERO, |at| {
            self.config
                .recovery_timeout
                .saturating_sub(now.saturating_duration_since(at))
        })
    }

    fn admit(&self) -> Result<Admission, BreakerOpen> {
        let now = Instant::now();
        let mut inner = self.lock();

        match self.observed_state(&inner, now) {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!(breaker = %self.name, "Circuit breaker half-open, allowing trial call");
                Ok(Admission::Trial)
            }
            CircuitState::HalfOpen | CircuitState::Open => Err(BreakerOpen {
                name: self.name.clone(),
                retry_in: self.remaining_cooldown(&inner, now),
            }),
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match admission {
            Admission::Trial => {
                info!(breaker = %self.name, "Circuit breaker recovered -> closed");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
            }
            // A call admitted before the breaker opened cannot close it;
            // only a half-open trial can.
            Admission::Normal if inner.state == CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            Admission::Normal => {}
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        if admission == Admission::Trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            warn!(breaker = %self.name, "Circuit breaker trial call failed -> open");
        } else if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "Circuit breaker opened after consecutive failures"
            );
        }
    }

    /// A failure outside the monitored set: no state change, but a trial
    /// slot is handed back so the next caller can probe.
    fn record_neutral(&self, admission: Admission) {
        if admission == Admission::Trial {
            self.lock().trial_in_flight = false;
        }
    }
}

/// Releases the half-open trial slot if the trial future is dropped
/// before it completes.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("dependency down")]
        Down,
        #[error("bad request")]
        BadRequest,
        #[error(transparent)]
        Open(#[from] BreakerOpen),
    }

    impl Fault for TestError {
        fn fault_kind(&self) -> FaultKind {
            match self {
                Self::Down => FaultKind::Server,
                Self::BadRequest => FaultKind::Rejected,
                Self::Open(e) => e.fault_kind(),
            }
        }
    }

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new(threshold, Duration::from_secs(recovery_secs)),
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), TestError> {
        breaker.call(|| async { Err(TestError::Down) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), TestError> {
        breaker.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_skips_operation() {
        let breaker = breaker(3, 30);
        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(TestError::Down)));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result: Result<(), TestError> = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(TestError::Open(open)) => {
                assert_eq!(open.name, "test");
                assert_eq!(open.retry_in, Duration::from_secs(30));
            }
            other => panic!("expected breaker-open rejection, got {other:?}"),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let breaker = breaker(3, 30);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmonitored_errors_do_not_count() {
        let breaker = breaker(2, 30);
        for _ in 0..5 {
            let result: Result<(), TestError> =
                breaker.call(|| async { Err(TestError::BadRequest) }).await;
            assert!(matches!(result, Err(TestError::BadRequest)));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitored_set_is_configurable() {
        let breaker = CircuitBreaker::new(
            "rejections",
            CircuitBreakerConfig {
                monitored: vec![FaultKind::Rejected],
                ..CircuitBreakerConfig::new(2, Duration::from_secs(30))
            },
        );

        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        for _ in 0..2 {
            let result: Result<(), TestError> =
                breaker.call(|| async { Err(TestError::BadRequest) }).await;
            assert!(matches!(result, Err(TestError::BadRequest)));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().name, "rejections");
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_recovery_then_closes_on_success() {
        let breaker = breaker(1, 10);
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_restarts_cooldown() {
        let breaker = breaker(1, 10);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(10)).await;

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        match succeed(&breaker).await {
            Err(TestError::Open(open)) => assert_eq!(open.retry_in, Duration::from_secs(5)),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_concurrent_trial_call() {
        let breaker = Arc::new(breaker(1, 10));
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(11)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = Arc::clone(&breaker);
        let trial = tokio::spawn(async move {
            trial_breaker
                .call(|| async {
                    let _ = wait.await;
                    Ok::<_, TestError>("trial")
                })
                .await
        });
        // Let the spawned trial get admitted.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let invoked = AtomicU32::new(0);
        let second: Result<(), TestError> = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(second, Err(TestError::Open(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), "trial");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let breaker = breaker(1, 10);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(10)).await;

        {
            let pending = breaker.call(|| std::future::pending::<Result<(), TestError>>());
            let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
            assert!(timed_out.is_err());
        }

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
