//! Failure taxonomy shared by every resilience component.
//!
//! # Classes
//! - Transient: dependency hiccup (5xx, 429); retried up to the policy limit
//! - Permanent: validation, other 4xx, programming errors; surfaced at once
//! - CircuitOpen: synthetic, raised by the breaker itself
//!
//! # Design Decisions
//! - The wrapped operation's own error is carried unchanged in
//!   `ResilienceError::Operation`; retries never wrap it in a new type
//! - Status codes are the only input the default retry predicate looks at

use thiserror::Error;

/// An error produced by a call to an external dependency.
///
/// Implementors expose an HTTP-like status code when they have one. The
/// default retry predicate and [`FailureClass`] are derived from it.
pub trait DependencyError: std::error::Error + Send + Sync + 'static {
    /// HTTP-like status code carried by the error, if any.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Classify this error as transient or permanent.
    fn class(&self) -> FailureClass {
        FailureClass::from_status(self.status_code())
    }
}

/// Failure classes of the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Retryable dependency failure (5xx / 429).
    Transient,
    /// Non-retryable failure (validation, 4xx other than 429, bugs).
    Permanent,
    /// The circuit breaker rejected the call.
    CircuitOpen,
}

impl FailureClass {
    /// Map an optional status code onto the taxonomy.
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(429) => FailureClass::Transient,
            Some(code) if code >= 500 => FailureClass::Transient,
            _ => FailureClass::Permanent,
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
            FailureClass::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// Errors surfaced by the circuit breaker and the resilience context.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The breaker for `name` is open and no fallback was registered.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// The wrapped operation failed; the error is passed through verbatim.
    #[error(transparent)]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// True if the breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Borrow the operation's own error, if that is what failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            ResilienceError::CircuitOpen { .. } => None,
        }
    }

    /// Take the operation's own error, if that is what failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            ResilienceError::CircuitOpen { .. } => None,
        }
    }
}

impl<E: DependencyError> ResilienceError<E> {
    /// Classify the surfaced error.
    pub fn class(&self) -> FailureClass {
        match self {
            ResilienceError::CircuitOpen { .. } => FailureClass::CircuitOpen,
            ResilienceError::Operation(e) => e.class(),
        }
    }
}

/// Result type for calls made through the resilience layer.
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
