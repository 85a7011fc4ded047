//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Durations are expressed in milliseconds.

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Admin API settings.
    pub admin: AdminConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Default retry policy.
    pub retries: RetrySettings,

    /// Default circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Notification buffer settings.
    pub reporter: ReporterConfig,

    /// External dependencies called through the resilience layer.
    pub dependencies: Vec<DependencyConfig>,
}

impl GuardConfig {
    /// Look up a dependency by name.
    pub fn dependency(&self, name: &str) -> Option<&DependencyConfig> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Milliseconds after the last failure before a probe is allowed.
    pub reset_timeout_ms: u64,

    /// Failures older than this are forgotten on success (milliseconds).
    pub monitoring_period_ms: u64,

    /// Half-open successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 10_000,
            success_threshold: 3,
        }
    }
}

/// Notification buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReporterConfig {
    /// Maximum notifications retained (oldest evicted first).
    pub capacity: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// An external dependency reached over HTTP.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DependencyConfig {
    /// Stable dependency name; also the circuit breaker key.
    pub name: String,

    /// Base URL requests are resolved against.
    pub base_url: String,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_dependency_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry override for this dependency.
    #[serde(default)]
    pub retries: Option<RetrySettings>,

    /// Circuit breaker override for this dependency.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSettings>,
}

fn default_dependency_timeout_ms() -> u64 {
    10_000
}
