//! HTTP client for one named dependency.
//!
//! # Data Flow
//! ```text
//! get_json / post_json
//!     → url join + x-request-id (one id per logical call)
//!     → ResilienceContext::with_error_handling
//!         → per attempt: with_timeout(send → status check → decode)
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::config::schema::{CircuitBreakerSettings, DependencyConfig, RetrySettings};
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::context::{ErrorHandlingOptions, ResilienceContext};
use crate::resilience::error::{ResilienceError, ResilienceResult};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::with_timeout;
use crate::upstream::error::UpstreamError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Calls one external dependency through the resilience layer.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    name: String,
    base_url: Url,
    timeout: Duration,
    retries: Option<RetrySettings>,
    circuit_breaker: Option<CircuitBreakerSettings>,
    http: reqwest::Client,
    context: ResilienceContext,
}

impl UpstreamClient {
    /// Client for `config`. Dependencies without overrides follow the
    /// context defaults at call time.
    pub fn new(config: &DependencyConfig, context: ResilienceContext) -> Result<Self, UpstreamError> {
        let mut base_url = Url::parse(&config.base_url)?;
        // `join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            name: config.name.clone(),
            base_url,
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries.clone(),
            circuit_breaker: config.circuit_breaker.clone(),
            http: reqwest::Client::new(),
            context,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn retry_policy(&self) -> RetryPolicy<UpstreamError> {
        match &self.retries {
            Some(settings) => RetryPolicy::from_settings(settings),
            None => self.context.default_retry_policy(),
        }
    }

    fn circuit_config(&self) -> CircuitBreakerConfig {
        match &self.circuit_breaker {
            Some(settings) => CircuitBreakerConfig::from(settings),
            None => self.context.default_circuit_config(),
        }
    }

    pub async fn get_json<T>(&self, path: &str) -> ResilienceResult<T, UpstreamError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.call(Method::GET, path, None, None).await
    }

    /// GET that degrades to `fallback` when the dependency is unavailable.
    pub async fn get_json_or<T, F>(&self, path: &str, fallback: F) -> ResilienceResult<T, UpstreamError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.call(Method::GET, path, None, Some(Arc::new(fallback))).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ResilienceResult<T, UpstreamError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| ResilienceError::Operation(UpstreamError::from(e)))?;
        self.call(Method::POST, path, Some(body), None).await
    }

    async fn call<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        fallback: Option<Arc<dyn Fn() -> T + Send + Sync>>,
    ) -> ResilienceResult<T, UpstreamError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ResilienceError::Operation(UpstreamError::from(e)))?;
        let request_id = Uuid::new_v4().to_string();

        tracing::debug!(
            dependency = %self.name,
            %method,
            %url,
            request_id = %request_id,
            "Calling dependency"
        );

        let operation = || {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(REQUEST_ID_HEADER, request_id.as_str());
            if let Some(body) = &body {
                request = request.json(body);
            }
            let dependency = self.name.clone();

            with_timeout(self.timeout, async move {
                let response = request.send().await.map_err(|source| UpstreamError::Transport {
                    dependency: dependency.clone(),
                    source,
                })?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(UpstreamError::Status {
                        dependency,
                        status: status.as_u16(),
                        body,
                    });
                }

                response
                    .json::<T>()
                    .await
                    .map_err(|source| UpstreamError::Decode { dependency, source })
            })
        };

        let mut options = ErrorHandlingOptions::new(self.name.clone())
            .retry(self.retry_policy())
            .circuit_breaker(self.circuit_config());
        if let Some(fallback) = fallback {
            options = options.fallback(move || fallback());
        }

        self.context.with_error_handling(operation, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dependency(base_url: &str) -> DependencyConfig {
        DependencyConfig {
            name: "music-api".to_string(),
            base_url: base_url.to_string(),
            timeout_ms: 250,
            retries: None,
            circuit_breaker: None,
        }
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = UpstreamClient::new(&dependency("no scheme"), ResilienceContext::new()).unwrap_err();
        assert!(matches!(err, UpstreamError::Url(_)));
    }

    #[test]
    fn test_base_path_is_kept_when_joining() {
        let client = UpstreamClient::new(&dependency("https://music.example.com/v1"), ResilienceContext::new()).unwrap();
        assert_eq!(client.base_url().as_str(), "https://music.example.com/v1/");
        assert_eq!(
            client.base_url().join("tracks").unwrap().as_str(),
            "https://music.example.com/v1/tracks"
        );

        let client = UpstreamClient::new(&dependency("https://music.example.com"), ResilienceContext::new()).unwrap();
        assert_eq!(client.base_url().as_str(), "https://music.example.com/");
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let mut config = dependency("https://music.example.com/v1/");
        config.retries = Some(RetrySettings {
            max_attempts: 7,
            ..Default::default()
        });
        let client = UpstreamClient::new(&config, ResilienceContext::new()).unwrap();
        assert_eq!(client.retry_policy().get_max_attempts(), 7);
        assert_eq!(client.circuit_config(), CircuitBreakerConfig::default());
        assert_eq!(client.timeout, Duration::from_millis(250));
    }
}
