//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience layer produces:
//!     → tracing events (retries, transitions, config reloads)
//!     → metrics.rs (calls, retries, transitions, fallbacks)
//!     → ErrorReporter notifications
//!         → logging.rs bridge → tracing + notifications_total
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint
//!     → Admin API (notification buffer)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - The library never installs a subscriber or recorder on its own;
//!   the service binary does

pub mod logging;
pub mod metrics;
