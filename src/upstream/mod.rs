//! Outbound HTTP call sites.
//!
//! # Responsibilities
//! - One client per configured dependency, keyed by its stable name
//! - Map transport failures and HTTP statuses onto the failure taxonomy
//! - Bound every attempt with the dependency's timeout
//!
//! # Design Decisions
//! - Dependency names double as breaker and fallback keys, so they never
//!   change once deployed
//! - Clients hold no resilience state; the shared context does

pub mod client;
pub mod error;

use std::collections::HashMap;

pub use client::UpstreamClient;
pub use error::UpstreamError;

use crate::config::schema::GuardConfig;
use crate::resilience::ResilienceContext;

/// Hosted database (REST over Postgres).
pub const DATABASE: &str = "database-operation";
/// LLM chat completion provider.
pub const LLM_CHAT: &str = "llm-chat";
/// Music streaming API.
pub const MUSIC_API: &str = "music-api";

/// Build a client for every configured dependency.
pub fn clients_from_config(
    config: &GuardConfig,
    context: &ResilienceContext,
) -> Result<HashMap<String, UpstreamClient>, UpstreamError> {
    config
        .dependencies
        .iter()
        .map(|dependency| {
            let client = UpstreamClient::new(dependency, context.clone())?;
            tracing::info!(
                dependency = %dependency.name,
                base_url = %client.base_url(),
                timeout_ms = dependency.timeout_ms,
                "Dependency client ready"
            );
            Ok((dependency.name.clone(), client))
        })
        .collect()
}
