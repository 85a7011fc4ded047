//! Admin API.
//!
//! # Endpoints
//! - `GET /admin/status`
//! - `GET /admin/circuits`, `GET /admin/circuits/{name}`
//! - `POST /admin/circuits/{name}/reset`
//! - `GET /admin/notifications?level=`, `DELETE /admin/notifications`
//!
//! # Design Decisions
//! - Every route sits behind a bearer token
//! - The token is swappable so a config reload can rotate it
//! - Handlers only read from or reset the shared `ResilienceContext`

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::resilience::ResilienceContext;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub context: ResilienceContext,
    api_key: Arc<ArcSwap<String>>,
}

impl AdminState {
    pub fn new(context: ResilienceContext, api_key: impl Into<String>) -> Self {
        Self {
            context,
            api_key: Arc::new(ArcSwap::from_pointee(api_key.into())),
        }
    }

    pub fn api_key(&self) -> Arc<String> {
        self.api_key.load_full()
    }

    /// Replace the accepted token for subsequent requests.
    pub fn set_api_key(&self, api_key: impl Into<String>) {
        self.api_key.store(Arc::new(api_key.into()));
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuits", get(list_circuits))
        .route("/admin/circuits/{name}", get(get_circuit))
        .route("/admin/circuits/{name}/reset", post(reset_circuit))
        .route(
            "/admin/notifications",
            get(list_notifications).delete(clear_notifications),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on `listener` until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
