//! Circuit breaker gating calls into agents and external collaborators.
//!
//! States:
//! - `CLOSED`: normal operation.
//! - `OPEN`: rejecting calls until the reset timeout elapses.
//! - `HALF_OPEN`: a limited number of probe calls decide recovery.
//!
//! Opening decisions combine a consecutive-failure threshold with a rolling
//! failure-rate window gated by a minimum throughput, so a single early
//! failure on a quiet breaker can't trip it.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ymera_types::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub reset_timeout_ms: u64,
    pub window_size: usize,
    pub min_throughput: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
            window_size: 100,
            min_throughput: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub failure_rate: f64,
    pub state_changes: u64,
    pub times_opened: u64,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker '{name}' is open (retry after {retry_after_ms}ms)")]
    Open { name: String, retry_after_ms: u64 },
    #[error(transparent)]
    Inner(E),
}

struct Inner {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    call_history: VecDeque<bool>,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
    state_changes: u64,
    times_opened: u64,
    opened_at: Option<chrono::DateTime<chrono::Utc>>,
    last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    last_success_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            call_history: VecDeque::new(),
            total_calls: 0,
            total_failures: 0,
            total_successes: 0,
            state_changes: 0,
            times_opened: 0,
            opened_at: None,
            last_failure_at: None,
            last_success_at: None,
        }
    }

    fn push_history(&mut self, window_size: usize, success: bool) {
        self.call_history.push_back(success);
        while self.call_history.len() > window_size {
            self.call_history.pop_front();
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.call_history.is_empty() {
            return 0.0;
        }
        let failures = self.call_history.iter().filter(|ok| !**ok).count();
        failures as f64 / self.call_history.len() as f64
    }
}

/// Per-operation circuit breaker. Cheaply cloneable (`Arc`-backed internals
/// aren't exposed directly; clone a `BreakerRegistry` handle instead).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &guard.state)
            .field("failure_count", &guard.failure_count)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute `operation` if the breaker allows it, recording the outcome.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Same as `execute`, but falls back to `fallback` instead of erroring
    /// when the breaker is open or the operation itself fails.
    pub async fn execute_with_fallback<F, Fut, Fb, FbFut, T, E>(
        &self,
        operation: F,
        fallback: Fb,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open { .. }) => {
                fallback().await.map_err(CircuitBreakerError::Inner)
            }
            Err(other) => Err(other),
        }
    }

    fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut guard = self.inner.lock();
        guard.total_calls += 1;

        if guard.state == CircuitState::Open {
            let opened_at = guard.opened_at.unwrap_or_else(|| self.clock.now());
            let elapsed = self.clock.now() - opened_at;
            let timeout = chrono::Duration::milliseconds(self.config.reset_timeout_ms as i64);
            if elapsed < timeout {
                let retry_after_ms = (timeout - elapsed).num_milliseconds().max(0) as u64;
                return Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after_ms,
                });
            }
            self.transition(&mut guard, CircuitState::HalfOpen);
        }

        Ok(())
    }

    fn on_success(&self) {
        let mut guard = self.inner.lock();
        guard.total_successes += 1;
        guard.last_success_at = Some(self.clock.now());
        guard.push_history(self.config.window_size, true);

        match guard.state {
            CircuitState::HalfOpen => {
                guard.success_count += 1;
                if guard.success_count >= self.config.success_threshold {
                    self.transition(&mut guard, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                guard.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut guard = self.inner.lock();
        guard.total_failures += 1;
        guard.failure_count += 1;
        guard.last_failure_at = Some(self.clock.now());
        guard.push_history(self.config.window_size, false);

        warn!(breaker = %self.name, failure_count = guard.failure_count, "circuit breaker recorded failure");

        match guard.state {
            CircuitState::HalfOpen => self.transition(&mut guard, CircuitState::Open),
            CircuitState::Closed => {
                if self.should_open(&guard) {
                    self.transition(&mut guard, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn should_open(&self, guard: &Inner) -> bool {
        if guard.failure_count >= self.config.failure_threshold {
            return true;
        }
        guard.call_history.len() >= self.config.min_throughput && guard.failure_rate() > 0.5
    }

    fn transition(&self, guard: &mut Inner, target: CircuitState) {
        if guard.state == target {
            return;
        }
        let previous = guard.state;
        guard.state = target;
        guard.state_changes += 1;
        match target {
            CircuitState::Open => {
                guard.opened_at = Some(self.clock.now());
                guard.success_count = 0;
                guard.times_opened += 1;
                warn!(breaker = %self.name, ?previous, "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                guard.failure_count = 0;
                guard.success_count = 0;
                info!(breaker = %self.name, ?previous, "circuit breaker entering half-open");
            }
            CircuitState::Closed => {
                guard.failure_count = 0;
                guard.success_count = 0;
                guard.opened_at = None;
                info!(breaker = %self.name, ?previous, "circuit breaker closed");
            }
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let guard = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: guard.state,
            failure_count: guard.failure_count,
            success_count: guard.success_count,
            total_calls: guard.total_calls,
            total_failures: guard.total_failures,
            total_successes: guard.total_successes,
            failure_rate: guard.failure_rate(),
            state_changes: guard.state_changes,
            times_opened: guard.times_opened,
            last_failure_at: guard.last_failure_at,
            last_success_at: guard.last_success_at,
        }
    }

    pub fn reset(&self) {
        let mut guard = self.inner.lock();
        *guard = Inner::new();
        info!(breaker = %self.name, "circuit breaker manually reset");
    }

    pub fn force_open(&self) {
        let mut guard = self.inner.lock();
        self.transition(&mut guard, CircuitState::Open);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ymera_types::clock::FixedClock;

    fn breaker_with_clock(config: CircuitBreakerConfig) -> (CircuitBreaker, FixedClock) {
        let clock = FixedClock::new(chrono::Utc::now());
        let breaker = CircuitBreaker::with_clock("test", config, Arc::new(clock.clone()));
        (breaker, clock)
    }

    #[tokio::test]
    async fn starts_closed_and_stays_closed_on_success() {
        let (breaker, _clock) = breaker_with_clock(CircuitBreakerConfig::default());
        let result: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Ok::<i32, &str>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_consecutive_failure_threshold() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            min_throughput: 100,
            ..Default::default()
        };
        let (breaker, _clock) = breaker_with_clock(config);

        for _ in 0..2 {
            let _: Result<i32, CircuitBreakerError<&str>> =
                breaker.execute(|| async { Err::<i32, &str>("boom") }).await;
        }

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn rejects_calls_while_open_until_timeout_elapses() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            min_throughput: 1,
            reset_timeout_ms: 5_000,
            ..Default::default()
        };
        let (breaker, clock) = breaker_with_clock(config);

        let _: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Err::<i32, &str>("boom") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Ok::<i32, &str>(1) }).await;
        assert!(matches!(rejected, Err(CircuitBreakerError::Open { .. })));

        clock.advance(chrono::Duration::milliseconds(5_001));
        let admitted: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Ok::<i32, &str>(1) }).await;
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            min_throughput: 1,
            reset_timeout_ms: 1_000,
            ..Default::default()
        };
        let (breaker, clock) = breaker_with_clock(config);

        let _: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Err::<i32, &str>("boom") }).await;
        clock.advance(chrono::Duration::milliseconds(1_001));

        let _: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Err::<i32, &str>("boom again") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            min_throughput: 1,
            reset_timeout_ms: 1_000,
            ..Default::default()
        };
        let (breaker, clock) = breaker_with_clock(config);

        let _: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Err::<i32, &str>("boom") }).await;
        clock.advance(chrono::Duration::milliseconds(1_001));

        for _ in 0..2 {
            let _: Result<i32, CircuitBreakerError<&str>> =
                breaker.execute(|| async { Ok::<i32, &str>(1) }).await;
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn min_throughput_suppresses_low_volume_failure_rate_trip() {
        let config = CircuitBreakerConfig {
            failure_threshold: 100,
            min_throughput: 10,
            window_size: 10,
            ..Default::default()
        };
        let (breaker, _clock) = breaker_with_clock(config);

        for _ in 0..3 {
            let _: Result<i32, CircuitBreakerError<&str>> =
                breaker.execute(|| async { Err::<i32, &str>("boom") }).await;
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failure_rate_above_half_trips_once_min_throughput_met() {
        let config = CircuitBreakerConfig {
            failure_threshold: 100,
            min_throughput: 4,
            window_size: 4,
            ..Default::default()
        };
        let (breaker, _clock) = breaker_with_clock(config);

        let _: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Ok::<i32, &str>(1) }).await;
        for _ in 0..3 {
            let _: Result<i32, CircuitBreakerError<&str>> =
                breaker.execute(|| async { Err::<i32, &str>("boom") }).await;
        }

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn execute_with_fallback_runs_fallback_when_open() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            min_throughput: 1,
            reset_timeout_ms: 60_000,
            ..Default::default()
        };
        let (breaker, _clock) = breaker_with_clock(config);

        let _: Result<i32, CircuitBreakerError<&str>> =
            breaker.execute(|| async { Err::<i32, &str>("boom") }).await;

        let result = breaker
            .execute_with_fallback(
                || async { Ok::<i32, &str>(1) },
                || async { Ok::<i32, &str>(99) },
            )
            .await;
        assert_eq!(result.unwrap(), 99);
    }
}
