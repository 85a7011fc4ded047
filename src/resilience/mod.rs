//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → context.rs (register fallback, pick policies)
//!     → circuit_breaker.rs (reject fast while open)
//!     → retries.rs (retry transient failures with backoff.rs delays)
//!     → timeouts.rs (per-attempt deadline)
//!     → On terminal failure: reporter.rs notification, fallback.rs value
//! ```
//!
//! # Design Decisions
//! - Breakers are keyed by dependency name and shared process-wide
//! - Retries run inside the breaker: one exhausted retry loop counts as
//!   one breaker failure
//! - Errors pass through unchanged; only an open circuit adds a variant
//! - Everything is opt-in per call through `ErrorHandlingOptions`

pub mod backoff;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod fallback;
pub mod registry;
pub mod reporter;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPhase, CircuitSnapshot};
pub use context::{ErrorHandlingOptions, ResilienceContext};
pub use error::{DependencyError, FailureClass, ResilienceError, ResilienceResult};
pub use reporter::{ErrorEvent, ErrorReporter, Level};
pub use retries::{retry, RetryPolicy};
pub use timeouts::{with_timeout, TimeoutError};
