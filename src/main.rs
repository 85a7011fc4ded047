//! outbound-guard service.
//!
//! # Architecture Overview
//!
//! ```text
//!     call site (db / llm / music)
//!         │
//!         ▼
//!   ┌───────────────┐     ┌──────────────┐     ┌───────────────┐
//!   │ UpstreamClient│────▶│ Resilience   │────▶│ external HTTP │
//!   │  (per dep)    │     │ Context      │     │ dependency    │
//!   └───────────────┘     │ retry / cb / │     └───────────────┘
//!                         │ fallback     │
//!                         └──────┬───────┘
//!                                │ notifications, transitions
//!                                ▼
//!   ┌──────────┐   ┌──────────────────┐   ┌──────────────┐
//!   │ tracing  │◀──│  ErrorReporter   │──▶│  Admin API   │
//!   └──────────┘   └──────────────────┘   └──────────────┘
//!                                                 ▲
//!   config file ──▶ watcher ──▶ apply_config      │ guard-cli
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use outbound_guard::config::loader::load_config;
use outbound_guard::observability::logging::init_logging;
use outbound_guard::{GuardConfig, Service};

#[derive(Parser)]
#[command(name = "outbound-guard")]
#[command(about = "Resilience layer for outbound dependency calls", long_about = None)]
struct Args {
    /// TOML configuration file; watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for background tasks on shutdown.
    #[arg(long, default_value_t = 10)]
    drain_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        dependencies = config.dependencies.len(),
        "outbound-guard starting"
    );

    let service = Service::start(config, args.config).await?;
    service.run_until_stopped(Duration::from_secs(args.drain_secs)).await;

    Ok(())
}
