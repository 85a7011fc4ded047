//! Retry logic.
//!
//! # Responsibilities
//! - Decide per failure whether an operation is retried
//! - Execute attempts sequentially with exponential backoff
//! - Hard cap on attempts; the last error is re-raised unchanged
//!
//! # Design Decisions
//! - Backoff sleeps are tokio timers; unrelated tasks keep running
//! - Only 5xx and 429 are retried unless the caller supplies a predicate
//! - `on_retry` is observation only; it cannot alter control flow

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::RetrySettings;
use crate::resilience::backoff::{apply_jitter, calculate_backoff};
use crate::resilience::error::{DependencyError, FailureClass};

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type RetryHook<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// How an operation is retried.
///
/// Cheap to clone; the predicate and hook are shared.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
    retry_predicate: RetryPredicate<E>,
    on_retry: Option<RetryHook<E>>,
}

impl<E> RetryPolicy<E> {
    /// Build a policy with an explicit predicate.
    pub fn with_predicate<P>(predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            jitter: false,
            retry_predicate: Arc::new(predicate),
            on_retry: None,
        }
    }

    /// Total attempts including the first one (at least 1).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Initial and maximum delay. `max` is raised to `initial` if lower.
    pub fn delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self
    }

    /// Factor applied to the delay after every retry (at least 1).
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        self
    }

    /// Add up to 10% random jitter to every delay, still capped at the max delay.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Replace the retry predicate.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Arc::new(predicate);
        self
    }

    /// Side-effect hook called with the error and the failed attempt number
    /// before each backoff sleep.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Chain an extra hook after the existing one.
    pub(crate) fn and_on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&E, u32) + Send + Sync + 'static,
        E: 'static,
    {
        let chained: RetryHook<E> = match self.on_retry.take() {
            Some(existing) => Arc::new(move |error: &E, attempt: u32| {
                existing(error, attempt);
                hook(error, attempt);
            }),
            None => Arc::new(hook),
        };
        self.on_retry = Some(chained);
        self
    }

    pub fn get_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Whether `error` may be retried under this policy.
    pub fn should_retry(&self, error: &E) -> bool {
        (self.retry_predicate)(error)
    }

    /// Delay slept after the given failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = calculate_backoff(attempt, self.initial_delay, self.max_delay, self.backoff_multiplier);
        if self.jitter {
            apply_jitter(delay).min(self.max_delay)
        } else {
            delay
        }
    }
}

impl<E: DependencyError> RetryPolicy<E> {
    /// Policy built from the `[retries]` config section with the default
    /// predicate.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::default()
            .max_attempts(settings.max_attempts)
            .delays(
                Duration::from_millis(settings.initial_delay_ms),
                Duration::from_millis(settings.max_delay_ms),
            )
            .backoff_multiplier(settings.backoff_multiplier)
            .jitter(settings.jitter)
    }
}

impl<E: DependencyError> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::with_predicate(is_retryable)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            retry_predicate: self.retry_predicate.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Default predicate: retry only on status >= 500 or exactly 429.
pub fn is_retryable<E: DependencyError>(error: &E) -> bool {
    FailureClass::from_status(error.status_code()) == FailureClass::Transient
}

/// Run `operation` until it succeeds, the predicate refuses, or the
/// attempts run out. The last error is returned as-is.
pub async fn retry<T, E, F, Fut>(mut operation: F, policy: &RetryPolicy<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts || !policy.should_retry(&error) {
                    return Err(error);
                }

                if let Some(hook) = &policy.on_retry {
                    hook(&error, attempt);
                }

                let delay = policy.delay_after(attempt);
                tracing::debug!(attempt, delay = ?delay, "Retrying operation");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
