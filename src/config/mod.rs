//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → resilience defaults, dependency clients, admin API
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ResilienceContext::apply_config swaps the defaults
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Breakers already created keep their thresholds across reloads

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::GuardConfig;
pub use schema::AdminConfig;
pub use schema::CircuitBreakerSettings;
pub use schema::DependencyConfig;
pub use schema::ObservabilityConfig;
pub use schema::RetrySettings;
