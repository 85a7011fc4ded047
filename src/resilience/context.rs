//! Resilience context: the single entry point for outbound calls.
//!
//! # Data Flow
//! ```text
//! call site
//!     → with_error_handling(operation, options)
//!         → [register fallback under name]
//!         → [retry wraps operation]
//!         → [named circuit breaker wraps the (retrying) operation]
//!     → Ok: value returned
//!     → Err: error notification, then fallback value or original error
//! ```
//!
//! # Design Decisions
//! - Constructed once at startup and cloned into every call site; clones
//!   share breakers, fallbacks and the reporter
//! - Breaker config is first-writer-wins per name
//! - Defaults can be swapped at runtime (config reload) without touching
//!   breakers that already exist

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::json;

use crate::config::schema::{GuardConfig, RetrySettings};
use crate::observability::metrics::{self, CallOutcome};
use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitHooks, CircuitPhase, CircuitSnapshot,
};
use crate::resilience::error::{DependencyError, ResilienceError};
use crate::resilience::fallback::{Fallback, FallbackRegistry};
use crate::resilience::registry::CircuitBreakerRegistry;
use crate::resilience::reporter::{context, ErrorReporter, DEFAULT_CAPACITY};
use crate::resilience::retries::{retry, RetryPolicy};

#[derive(Debug, Clone, Default)]
struct Defaults {
    retry: RetrySettings,
    circuit_breaker: CircuitBreakerConfig,
}

impl Defaults {
    fn from_config(config: &GuardConfig) -> Self {
        Self {
            retry: config.retries.clone(),
            circuit_breaker: CircuitBreakerConfig::from(&config.circuit_breaker),
        }
    }
}

struct Inner {
    breakers: CircuitBreakerRegistry,
    fallbacks: FallbackRegistry,
    reporter: Arc<ErrorReporter>,
    defaults: ArcSwap<Defaults>,
}

/// Shared resilience state: breakers, fallbacks and the error reporter.
#[derive(Clone)]
pub struct ResilienceContext {
    inner: Arc<Inner>,
}

impl ResilienceContext {
    /// Context with built-in defaults.
    pub fn new() -> Self {
        Self::build(Defaults::default(), DEFAULT_CAPACITY)
    }

    /// Context whose defaults come from the configuration.
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::build(Defaults::from_config(config), config.reporter.capacity)
    }

    fn build(defaults: Defaults, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                breakers: CircuitBreakerRegistry::new(),
                fallbacks: FallbackRegistry::new(),
                reporter: Arc::new(ErrorReporter::with_capacity(capacity)),
                defaults: ArcSwap::from_pointee(defaults),
            }),
        }
    }

    /// Swap the defaults used by `with_retry(.., None)` and by breakers
    /// created from now on.
    pub fn apply_config(&self, config: &GuardConfig) {
        self.inner.defaults.store(Arc::new(Defaults::from_config(config)));
        tracing::info!(
            max_attempts = config.retries.max_attempts,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "Resilience defaults updated"
        );
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.inner.reporter
    }

    pub fn fallbacks(&self) -> &FallbackRegistry {
        &self.inner.fallbacks
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.inner.breakers
    }

    /// Register a fallback producer for `name`. Last registration wins.
    pub fn register_fallback<T, F>(&self, name: &str, producer: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.inner.fallbacks.register(name, producer);
    }

    /// Default retry policy from the current configuration.
    pub fn default_retry_policy<E: DependencyError>(&self) -> RetryPolicy<E> {
        RetryPolicy::from_settings(&self.inner.defaults.load().retry)
    }

    pub fn default_circuit_config(&self) -> CircuitBreakerConfig {
        self.inner.defaults.load().circuit_breaker.clone()
    }

    /// State of the named breaker; `None` if the name was never used.
    pub fn circuit_state(&self, name: &str) -> Option<CircuitSnapshot> {
        self.inner.breakers.snapshot(name)
    }

    pub fn circuits(&self) -> Vec<CircuitSnapshot> {
        self.inner.breakers.snapshots()
    }

    /// Force the named breaker closed. False for unknown names.
    pub fn reset_circuit(&self, name: &str) -> bool {
        if !self.inner.breakers.reset(name) {
            return false;
        }

        metrics::record_circuit_transition(name, CircuitPhase::Closed);
        self.inner.reporter.info(
            format!("Circuit breaker reset for {}", name),
            context([("dependency", json!(name))]),
        );
        true
    }

    /// Breaker for `name`, created with `config` (or the defaults) on first
    /// use. Later configs for the same name are ignored.
    pub fn circuit_breaker(&self, name: &str, config: Option<CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        self.inner.breakers.get_or_create(name, || {
            let config = config.unwrap_or_else(|| self.default_circuit_config());
            CircuitBreaker::new(name, config).with_hooks(self.reporting_hooks(name))
        })
    }

    fn reporting_hooks(&self, name: &str) -> CircuitHooks {
        let open = (self.inner.reporter.clone(), name.to_string());
        let close = open.clone();
        let half_open = open.clone();

        CircuitHooks::new()
            .on_open(move |failures| {
                let (reporter, name) = &open;
                metrics::record_circuit_transition(name, CircuitPhase::Open);
                reporter.warning(
                    format!("Circuit breaker opened for {}", name),
                    context([("dependency", json!(name)), ("failures", json!(failures))]),
                );
            })
            .on_close(move || {
                let (reporter, name) = &close;
                metrics::record_circuit_transition(name, CircuitPhase::Closed);
                reporter.info(
                    format!("Circuit breaker closed for {}", name),
                    context([("dependency", json!(name))]),
                );
            })
            .on_half_open(move || {
                let (reporter, name) = &half_open;
                metrics::record_circuit_transition(name, CircuitPhase::HalfOpen);
                reporter.info(
                    format!("Circuit breaker half-open for {}", name),
                    context([("dependency", json!(name))]),
                );
            })
    }

    /// Retry `operation` under `policy`, or the configured default policy.
    pub async fn with_retry<T, E, F, Fut>(&self, operation: F, policy: Option<RetryPolicy<E>>) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: DependencyError,
    {
        let policy = policy.unwrap_or_else(|| self.default_retry_policy());
        retry(operation, &policy).await
    }

    /// Run `operation` through the breaker named `name`.
    ///
    /// When the circuit is open and a fallback is registered for `name`,
    /// the fallback value is returned instead of `CircuitOpen`.
    pub async fn with_circuit_breaker<T, E, F, Fut>(
        &self,
        name: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> Result<T, ResilienceError<E>>
    where
        T: 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.circuit_breaker(name, config);

        match breaker.execute(operation).await {
            Ok(value) => {
                metrics::record_call(name, CallOutcome::Success);
                Ok(value)
            }
            Err(ResilienceError::CircuitOpen { name: open }) => {
                metrics::record_circuit_rejection(name);

                if let Some(fallback) = self.inner.fallbacks.get(name) {
                    match fallback.produce::<T>() {
                        Some(value) => {
                            metrics::record_call(name, CallOutcome::Fallback);
                            metrics::record_fallback(name);
                            self.inner.reporter.warning(
                                format!("Circuit breaker open for {}, using fallback", name),
                                context([("dependency", json!(name))]),
                            );
                            return Ok(value);
                        }
                        None => {
                            tracing::warn!(
                                dependency = %name,
                                registered = fallback.type_name(),
                                expected = std::any::type_name::<T>(),
                                "Fallback type does not match call site, ignoring"
                            );
                        }
                    }
                }

                metrics::record_call(name, CallOutcome::Rejected);
                Err(ResilienceError::CircuitOpen { name: open })
            }
            Err(error) => {
                metrics::record_call(name, CallOutcome::Failure);
                Err(error)
            }
        }
    }

    /// Run `operation` with the retry / circuit breaker / fallback chain
    /// described by `options`.
    ///
    /// Terminal failures are reported at error level. With a fallback the
    /// fallback value is returned; otherwise the original error propagates.
    pub async fn with_error_handling<T, E, F, Fut>(
        &self,
        mut operation: F,
        options: ErrorHandlingOptions<T, E>,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send + 'static,
        E: DependencyError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ErrorHandlingOptions {
            name,
            fallback,
            retry_policy,
            circuit_breaker,
        } = options;

        if let Some(fallback) = &fallback {
            let producer = fallback.clone();
            self.inner
                .fallbacks
                .register_fallback(&name, Fallback::new(move || producer()));
        }

        let retry_policy = retry_policy.map(|policy| {
            let dependency = name.clone();
            policy.and_on_retry(move |error: &E, attempt| {
                metrics::record_retry(&dependency);
                tracing::debug!(dependency = %dependency, attempt, error = %error, "Dependency call failed, retrying");
            })
        });

        let result = match (retry_policy, circuit_breaker) {
            (Some(policy), Some(config)) => {
                let operation = &mut operation;
                let policy = &policy;
                self.with_circuit_breaker(&name, move || retry(operation, policy), Some(config))
                    .await
            }
            (Some(policy), None) => {
                let result = retry(operation, &policy).await;
                record_unguarded(&name, &result);
                result.map_err(ResilienceError::Operation)
            }
            (None, Some(config)) => self.with_circuit_breaker(&name, operation, Some(config)).await,
            (None, None) => {
                let result = operation().await;
                record_unguarded(&name, &result);
                result.map_err(ResilienceError::Operation)
            }
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        self.inner.reporter.error(
            format!("Operation failed: {}", name),
            Some(&error),
            context([
                ("dependency", json!(name)),
                ("class", json!(error.class().to_string())),
            ]),
        );

        match fallback {
            Some(fallback) => {
                metrics::record_fallback(&name);
                self.inner.reporter.info(
                    format!("Using fallback for {}", name),
                    context([("dependency", json!(name))]),
                );
                Ok(fallback())
            }
            None => Err(error),
        }
    }
}

/// Count a call that ran without a breaker.
fn record_unguarded<T, E>(name: &str, result: &Result<T, E>) {
    let outcome = if result.is_ok() { CallOutcome::Success } else { CallOutcome::Failure };
    metrics::record_call(name, outcome);
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("breakers", &self.inner.breakers.len())
            .field("reporter", &self.inner.reporter)
            .finish()
    }
}

/// Options for [`ResilienceContext::with_error_handling`].
pub struct ErrorHandlingOptions<T, E> {
    name: String,
    fallback: Option<Arc<dyn Fn() -> T + Send + Sync>>,
    retry_policy: Option<RetryPolicy<E>>,
    circuit_breaker: Option<CircuitBreakerConfig>,
}

impl<T, E> ErrorHandlingOptions<T, E> {
    /// Options for the dependency `name`; no retry, breaker or fallback.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallback: None,
            retry_policy: None,
            circuit_breaker: None,
        }
    }

    pub fn fallback<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(producer));
        self
    }

    pub fn retry(mut self, policy: RetryPolicy<E>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T, E> fmt::Debug for ErrorHandlingOptions<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlingOptions")
            .field("name", &self.name)
            .field("fallback", &self.fallback.is_some())
            .field("retry_policy", &self.retry_policy)
            .field("circuit_breaker", &self.circuit_breaker)
            .finish()
    }
}
