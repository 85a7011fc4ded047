//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: calls pass through experimentally
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: next call after reset_timeout since the last failure
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency name, each behind its own lock
//! - The lock is never held across the wrapped operation
//! - Hooks run after the lock is released, on the task that caused the
//!   transition

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerSettings;
use crate::resilience::error::ResilienceError;

/// Phase of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitPhase::Closed => write!(f, "closed"),
            CircuitPhase::Open => write!(f, "open"),
            CircuitPhase::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Thresholds and timings of a breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is let through.
    pub reset_timeout: Duration,
    /// Failures older than this are forgotten on the next success.
    pub monitoring_period: Duration,
    /// Half-open successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(10),
            success_threshold: 3,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
            monitoring_period: Duration::from_millis(settings.monitoring_period_ms),
            success_threshold: settings.success_threshold.max(1),
        }
    }
}

type OpenHook = Arc<dyn Fn(u32) + Send + Sync>;
type TransitionHook = Arc<dyn Fn() + Send + Sync>;

/// Transition callbacks. They must not panic.
#[derive(Clone, Default)]
pub struct CircuitHooks {
    on_open: Option<OpenHook>,
    on_close: Option<TransitionHook>,
    on_half_open: Option<TransitionHook>,
}

impl CircuitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the failure count when the circuit opens.
    pub fn on_open<F: Fn(u32) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_close<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    pub fn on_half_open<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_half_open = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for CircuitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitHooks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

/// A transition that happened under the lock and still has to be announced.
enum Transition {
    Opened(u32),
    Closed,
    HalfOpened,
}

#[derive(Debug)]
struct BreakerState {
    phase: CircuitPhase,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    half_open_successes: u32,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            consecutive_failures: 0,
            last_failure: None,
            half_open_successes: 0,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ms_ago: Option<u64>,
    pub failure_threshold: u32,
}

/// Circuit breaker guarding one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    hooks: CircuitHooks,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            hooks: CircuitHooks::default(),
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Attach transition hooks.
    pub fn with_hooks(mut self, hooks: CircuitHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current phase as last recorded. An Open breaker whose timeout has
    /// elapsed reports Open until the next call probes it.
    pub fn phase(&self) -> CircuitPhase {
        self.lock().phase
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            half_open_successes: state.half_open_successes,
            last_failure_ms_ago: state
                .last_failure
                .map(|at| at.elapsed().as_millis().min(u64::MAX as u128) as u64),
            failure_threshold: self.config.failure_threshold,
        }
    }

    /// Force the breaker closed with all counters zeroed.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = BreakerState::new();
        tracing::info!(dependency = %self.name, "Circuit breaker reset");
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejected calls return `CircuitOpen` without invoking the operation.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure();
                Err(ResilienceError::Operation(error))
            }
        }
    }

    /// Admit or reject a call, moving Open to HalfOpen once the timeout
    /// has elapsed.
    fn try_acquire<E>(&self) -> Result<(), ResilienceError<E>> {
        let transition = {
            let mut state = self.lock();
            match state.phase {
                CircuitPhase::Closed | CircuitPhase::HalfOpen => None,
                CircuitPhase::Open => {
                    let elapsed = state.last_failure.map(|at| at.elapsed());
                    match elapsed {
                        Some(elapsed) if elapsed < self.config.reset_timeout => {
                            return Err(ResilienceError::CircuitOpen {
                                name: self.name.clone(),
                            });
                        }
                        _ => {
                            state.phase = CircuitPhase::HalfOpen;
                            state.half_open_successes = 0;
                            Some(Transition::HalfOpened)
                        }
                    }
                }
            }
        };

        self.announce(transition);
        Ok(())
    }

    fn on_success(&self) {
        let transition = {
            let mut state = self.lock();
            match state.phase {
                CircuitPhase::Closed => {
                    let stale = state
                        .last_failure
                        .is_some_and(|at| at.elapsed() > self.config.monitoring_period);
                    if stale {
                        state.consecutive_failures = 0;
                    }
                    None
                }
                CircuitPhase::HalfOpen => {
                    state.half_open_successes += 1;
                    if state.half_open_successes >= self.config.success_threshold {
                        state.phase = CircuitPhase::Closed;
                        state.consecutive_failures = 0;
                        state.half_open_successes = 0;
                        Some(Transition::Closed)
                    } else {
                        None
                    }
                }
                // A call admitted before another one re-opened the circuit.
                CircuitPhase::Open => None,
            }
        };

        self.announce(transition);
    }

    fn on_failure(&self) {
        let transition = {
            let mut state = self.lock();
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_failure = Some(Instant::now());

            match state.phase {
                CircuitPhase::Closed => {
                    if state.consecutive_failures >= self.config.failure_threshold {
                        state.phase = CircuitPhase::Open;
                        Some(Transition::Opened(state.consecutive_failures))
                    } else {
                        None
                    }
                }
                CircuitPhase::HalfOpen => {
                    state.phase = CircuitPhase::Open;
                    state.half_open_successes = 0;
                    Some(Transition::Opened(state.consecutive_failures))
                }
                CircuitPhase::Open => None,
            }
        };

        self.announce(transition);
    }

    fn announce(&self, transition: Option<Transition>) {
        match transition {
            Some(Transition::Opened(failures)) => {
                tracing::warn!(dependency = %self.name, failures, "Circuit breaker opened");
                if let Some(hook) = &self.hooks.on_open {
                    hook(failures);
                }
            }
            Some(Transition::Closed) => {
                tracing::info!(dependency = %self.name, "Circuit breaker closed");
                if let Some(hook) = &self.hooks.on_close {
                    hook();
                }
            }
            Some(Transition::HalfOpened) => {
                tracing::info!(dependency = %self.name, "Circuit breaker half-open, probing");
                if let Some(hook) = &self.hooks.on_half_open {
                    hook();
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(threshold: u32, reset_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
            monitoring_period: Duration::from_secs(10),
            success_threshold: 3,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), ResilienceError<&'static str>> {
        breaker.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), ResilienceError<&'static str>> {
        breaker.execute(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let breaker = CircuitBreaker::new("database-operation", CircuitBreakerConfig::default());

        for _ in 0..5 {
            assert!(matches!(fail(&breaker).await, Err(ResilienceError::Operation("boom"))));
        }
        assert_eq!(breaker.phase(), CircuitPhase::Open);

        let calls = AtomicU32::new(0);
        let result: Result<(), ResilienceError<&str>> = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { ref name }) if name == "database-operation"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_three_successes() {
        let breaker = CircuitBreaker::new("llm-chat", config(2, 100));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.phase(), CircuitPhase::Open);

        tokio::time::advance(Duration::from_millis(100)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);
        succeed(&breaker).await.unwrap();

        assert_eq!(breaker.phase(), CircuitPhase::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("music-api", config(1, 50));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.phase(), CircuitPhase::Open);

        tokio::time::advance(Duration::from_millis(60)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.phase(), CircuitPhase::HalfOpen);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.phase(), CircuitPhase::Open);
        assert_eq!(breaker.snapshot().half_open_successes, 0);

        // The new failure restarted the timeout.
        assert!(matches!(succeed(&breaker).await, Err(ResilienceError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_until_timeout_elapses() {
        let breaker = CircuitBreaker::new("music-api", config(1, 1000));
        let _ = fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_circuit_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_keeps_recent_failures() {
        let breaker = CircuitBreaker::new("db", config(3, 1000));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.failure_count(), 2);

        // One more failure still trips the breaker.
        let _ = fail(&breaker).await;
        assert_eq!(breaker.phase(), CircuitPhase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_forgets_stale_failures() {
        let breaker = CircuitBreaker::new("db", config(3, 1000));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hooks_fire_on_transitions() {
        let opened = Arc::new(AtomicU32::new(0));
        let closed = Arc::new(AtomicU32::new(0));
        let half_opened = Arc::new(AtomicU32::new(0));

        let hooks = {
            let (o, c, h) = (opened.clone(), closed.clone(), half_opened.clone());
            CircuitHooks::new()
                .on_open(move |failures| {
                    o.store(failures, Ordering::SeqCst);
                })
                .on_close(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .on_half_open(move || {
                    h.fetch_add(1, Ordering::SeqCst);
                })
        };
        let breaker = CircuitBreaker::new("llm-chat", config(2, 10)).with_hooks(hooks);

        let _ = fail(&breaker).await;
        assert_eq!(opened.load(Ordering::SeqCst), 0);
        let _ = fail(&breaker).await;
        assert_eq!(opened.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_millis(10)).await;
        for _ in 0..3 {
            succeed(&breaker).await.unwrap();
        }
        assert_eq!(half_opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = CircuitBreaker::new("db", config(1, 60_000));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.phase(), CircuitPhase::Open);

        breaker.reset();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.phase, CircuitPhase::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.last_failure_ms_ago, None);
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_failures_open_exactly_once() {
        let opened = Arc::new(AtomicU32::new(0));
        let o = opened.clone();
        let breaker = Arc::new(
            CircuitBreaker::new("db", config(5, 60_000)).with_hooks(CircuitHooks::new().on_open(move |_| {
                o.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let mut handles = Vec::new();
        for _ in 0..5 {
            let breaker = breaker.clone();
            handles.push(tokio::spawn(async move {
                let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(breaker.phase(), CircuitPhase::Open);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = CircuitBreakerSettings {
            failure_threshold: 0,
            reset_timeout_ms: 1500,
            monitoring_period_ms: 200,
            success_threshold: 2,
        };
        let config = CircuitBreakerConfig::from(&settings);
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.reset_timeout, Duration::from_millis(1500));
        assert_eq!(config.monitoring_period, Duration::from_millis(200));
        assert_eq!(config.success_threshold, 2);
    }
}
