//! Timeout enforcement for call sites.
//!
//! # Responsibilities
//! - Bound a single outbound attempt with a deadline
//! - Report an elapsed deadline as a transient (504-class) failure
//!
//! # Design Decisions
//! - The retry executor and breaker never impose timeouts themselves; call
//!   sites wrap each attempt so a hung call cannot stall retries
//! - Uses Tokio's timeout facilities; the timed-out future is dropped

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::error::DependencyError;

/// Deadline elapsed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms", .0.as_millis())]
pub struct TimeoutError(pub Duration);

impl DependencyError for TimeoutError {
    fn status_code(&self) -> Option<u16> {
        Some(504)
    }
}

/// Run `operation` with a deadline of `limit`.
pub async fn with_timeout<T, E, Fut>(limit: Duration, operation: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(E::from(TimeoutError(limit))),
    }
}
