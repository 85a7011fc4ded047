//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the resilience context from configuration
//! - Initialize subsystems in dependency order
//! - Start background tasks (admin API, config watcher)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners are bound before any task is spawned
//! - The notification bridge is installed before anything can report

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::config::loader::ConfigError;
use crate::config::watcher::ConfigWatcher;
use crate::config::GuardConfig;
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::{logging, metrics};
use crate::resilience::reporter::Subscription;
use crate::resilience::ResilienceContext;
use crate::upstream::{self, UpstreamClient, UpstreamError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid {field} '{value}'")]
    Address { field: &'static str, value: String },

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A running service: shared context, dependency clients and the tasks
/// serving them.
pub struct Service {
    context: ResilienceContext,
    clients: HashMap<String, UpstreamClient>,
    admin_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
    bridge: Subscription,
    _watcher: Option<RecommendedWatcher>,
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}

impl Service {
    /// Start every subsystem described by `config`.
    ///
    /// `config_path` enables hot reload of that file.
    pub async fn start(config: GuardConfig, config_path: Option<PathBuf>) -> Result<Self, StartupError> {
        let context = ResilienceContext::from_config(&config);
        let bridge = logging::forward_notifications(context.reporter());

        if config.observability.metrics_enabled {
            let addr = parse_addr("observability.metrics_address", &config.observability.metrics_address)?;
            metrics::init_metrics(addr)?;
        }

        let clients = upstream::clients_from_config(&config, &context)?;
        let shutdown = Shutdown::new();
        let mut tasks = Vec::new();

        let mut admin_state = None;
        let mut admin_addr = None;
        if config.admin.enabled {
            let addr = parse_addr("admin.bind_address", &config.admin.bind_address)?;
            let listener = TcpListener::bind(addr).await?;
            admin_addr = Some(listener.local_addr()?);

            let state = AdminState::new(context.clone(), config.admin.api_key.clone());
            admin_state = Some(state.clone());

            let rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(listener, state, rx).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
        }

        let mut watcher = None;
        if let Some(path) = config_path {
            let (config_watcher, updates) = ConfigWatcher::new(&path, config.clone());
            watcher = Some(config_watcher.run()?);
            tasks.push(tokio::spawn(apply_updates(
                updates,
                context.clone(),
                admin_state,
                shutdown.subscribe(),
            )));
        }

        tracing::info!(
            dependencies = clients.len(),
            admin = config.admin.enabled,
            metrics = config.observability.metrics_enabled,
            "outbound-guard started"
        );

        Ok(Self {
            context,
            clients,
            admin_addr,
            shutdown,
            tasks,
            bridge,
            _watcher: watcher,
        })
    }

    pub fn context(&self) -> &ResilienceContext {
        &self.context
    }

    pub fn client(&self, name: &str) -> Option<&UpstreamClient> {
        self.clients.get(name)
    }

    /// Address the admin API is bound to, if enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Block until SIGINT/SIGTERM or an explicit trigger, then drain.
    pub async fn run_until_stopped(self, drain_deadline: Duration) {
        let mut stop = self.shutdown.subscribe();
        let signals = spawn_signal_listener(self.shutdown.clone());

        if !self.shutdown.is_triggered() {
            let _ = stop.recv().await;
        }
        signals.abort();

        self.stop(drain_deadline).await;
    }

    /// Trigger shutdown and wait for background tasks.
    pub async fn stop(self, drain_deadline: Duration) {
        self.shutdown.trigger();
        if !drain(self.tasks, drain_deadline).await {
            tracing::warn!("Some background tasks did not stop in time");
        }
        self.bridge.unsubscribe();
        tracing::info!("Shutdown complete");
    }
}

async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<GuardConfig>,
    context: ResilienceContext,
    admin: Option<AdminState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                context.apply_config(&config);
                if let Some(admin) = &admin {
                    admin.set_api_key(config.admin.api_key.clone());
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
