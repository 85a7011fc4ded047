//! Metrics collection and exposition.
//!
//! # Metrics
//! - `outbound_calls_total` (counter): calls by dependency, outcome
//! - `outbound_retries_total` (counter): retries by dependency
//! - `circuit_transitions_total` (counter): transitions by dependency, phase
//! - `circuit_rejections_total` (counter): fast-failed calls by dependency
//! - `circuit_phase` (gauge): 0=closed, 1=half_open, 2=open
//! - `fallbacks_used_total` (counter): fallback values served by dependency
//! - `notifications_total` (counter): reporter events by level
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Prometheus exposition via `metrics-exporter-prometheus`

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitPhase;
use crate::resilience::reporter::Level;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Outcome label for a completed outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    Rejected,
    Fallback,
}

impl CallOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Failure => "failure",
            CallOutcome::Rejected => "rejected",
            CallOutcome::Fallback => "fallback",
        }
    }
}

pub fn record_call(dependency: &str, outcome: CallOutcome) {
    counter!(
        "outbound_calls_total",
        "dependency" => dependency.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_retry(dependency: &str) {
    counter!("outbound_retries_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_circuit_transition(dependency: &str, phase: CircuitPhase) {
    counter!(
        "circuit_transitions_total",
        "dependency" => dependency.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);

    let value = match phase {
        CircuitPhase::Closed => 0.0,
        CircuitPhase::HalfOpen => 1.0,
        CircuitPhase::Open => 2.0,
    };
    gauge!("circuit_phase", "dependency" => dependency.to_string()).set(value);
}

pub fn record_circuit_rejection(dependency: &str) {
    counter!("circuit_rejections_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_fallback(dependency: &str) {
    counter!("fallbacks_used_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_notification(level: Level) {
    counter!("notifications_total", "level" => level.as_str()).increment(1);
}


#[cfg(test)]
mod tests {
    use super::capture::CapturingRecorder;
    use super::*;

    #[test]
    fn test_transition_sets_phase_gauge() {
        let recorder = CapturingRecorder::default();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_circuit_transition("music-api", CircuitPhase::Open);
        assert_eq!(recorder.gauge("circuit_phase{dependency=music-api}"), Some(2.0));

        record_circuit_transition("music-api", CircuitPhase::Closed);
        assert_eq!(recorder.gauge("circuit_phase{dependency=music-api}"), Some(0.0));
        assert_eq!(
            recorder.counter("circuit_transitions_total{dependency=music-api,phase=closed}"),
            1
        );
    }
}
