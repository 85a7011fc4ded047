//! Admin API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::resilience::circuit_breaker::{CircuitPhase, CircuitSnapshot};
use crate::resilience::reporter::{ErrorEvent, Level};

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub circuits: usize,
    pub open_circuits: usize,
    pub notifications: usize,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub level: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub name: String,
    pub phase: CircuitPhase,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let circuits = state.context.circuits();
    let open_circuits = circuits
        .iter()
        .filter(|c| c.phase == CircuitPhase::Open)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if open_circuits == 0 { "operational" } else { "degraded" }.to_string(),
        circuits: circuits.len(),
        open_circuits,
        notifications: state.context.reporter().len(),
    })
}

pub async fn list_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.context.circuits())
}

pub async fn get_circuit(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitSnapshot>, StatusCode> {
    state
        .context
        .circuit_state(&name)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn reset_circuit(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ResetResponse>, StatusCode> {
    if !state.context.reset_circuit(&name) {
        return Err(StatusCode::NOT_FOUND);
    }

    tracing::info!(dependency = %name, "Circuit breaker reset via admin API");
    Ok(Json(ResetResponse {
        name,
        phase: CircuitPhase::Closed,
    }))
}

pub async fn list_notifications(
    State(state): State<AdminState>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<ErrorEvent>>, (StatusCode, String)> {
    let level = query
        .level
        .as_deref()
        .map(str::parse::<Level>)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    Ok(Json(state.context.reporter().notifications(level)))
}

pub async fn clear_notifications(State(state): State<AdminState>) -> Json<ClearResponse> {
    let reporter = state.context.reporter();
    let cleared = reporter.len();
    reporter.clear();
    Json(ClearResponse { cleared })
}
