//! Error type for outbound HTTP calls.

use thiserror::Error;

use crate::resilience::error::DependencyError;
use crate::resilience::timeouts::TimeoutError;

/// Why a call to an upstream dependency failed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The dependency answered with a non-success status.
    #[error("{dependency} returned {status}: {body}")]
    Status {
        dependency: String,
        status: u16,
        body: String,
    },

    /// Connection refused, reset, DNS failure and the like.
    #[error("request to {dependency} failed")]
    Transport {
        dependency: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The dependency answered 2xx with a body we could not decode.
    #[error("invalid response body from {dependency}")]
    Decode {
        dependency: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid request path: {0}")]
    Url(#[from] url::ParseError),

    #[error("could not encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DependencyError for UpstreamError {
    fn status_code(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport { .. } => Some(503),
            UpstreamError::Timeout(e) => e.status_code(),
            UpstreamError::Decode { .. } | UpstreamError::Url(_) | UpstreamError::Encode(_) => None,
        }
    }
}
