//! Resilience layer for outbound calls to external dependencies.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::schema::GuardConfig;
pub use lifecycle::{Service, Shutdown};
pub use resilience::{ErrorHandlingOptions, ResilienceContext, ResilienceError, RetryPolicy};
