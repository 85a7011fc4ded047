//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Bridge reporter notifications into the log stream
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - The bridge is an ordinary reporter subscriber; dropping the
//!   subscription is not enough to stop it, call `unsubscribe`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::observability::metrics;
use crate::resilience::reporter::{ErrorEvent, ErrorReporter, Level, Subscription};

/// Build the filter from `RUST_LOG`, or from `level` for this crate.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("outbound_guard={level},tower_http={level}")))
}

/// Install the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Forward every reporter notification to `tracing` and count it.
pub fn forward_notifications(reporter: &ErrorReporter) -> Subscription {
    reporter.subscribe(|event| {
        metrics::record_notification(event.level);
        emit(event);
    })
}

fn emit(event: &ErrorEvent) {
    let context = serde_json::Value::Object(event.context.clone());
    let cause = event.cause.as_deref().unwrap_or("");

    match event.level {
        Level::Info => tracing::info!(event_id = %event.id, %context, "{}", event.message),
        Level::Warning => {
            tracing::warn!(event_id = %event.id, %context, cause, "{}", event.message)
        }
        Level::Error => {
            tracing::error!(event_id = %event.id, %context, cause, "{}", event.message)
        }
        Level::Critical => tracing::error!(
            event_id = %event.id,
            %context,
            cause,
            critical = true,
            "{}",
            event.message
        ),
    }
}
