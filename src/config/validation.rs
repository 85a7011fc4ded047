//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts >= 1, multiplier >= 1, max >= initial)
//! - Check dependency names are unique and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{CircuitBreakerSettings, GuardConfig, RetrySettings};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate the whole configuration.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_retries("retries", &config.retries, &mut errors);
    validate_circuit_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);

    if config.reporter.capacity == 0 {
        errors.push(ValidationError::new("reporter.capacity", "must be at least 1"));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    let mut seen = HashSet::new();
    for (i, dependency) in config.dependencies.iter().enumerate() {
        let prefix = format!("dependencies[{}]", i);

        if dependency.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", prefix), "must not be empty"));
        } else if !seen.insert(dependency.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", prefix),
                format!("duplicate dependency name '{}'", dependency.name),
            ));
        }

        if let Err(e) = url::Url::parse(&dependency.base_url) {
            errors.push(ValidationError::new(format!("{}.base_url", prefix), e.to_string()));
        }

        if dependency.timeout_ms == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_ms", prefix), "must be greater than 0"));
        }

        if let Some(retries) = &dependency.retries {
            validate_retries(&format!("{}.retries", prefix), retries, &mut errors);
        }
        if let Some(breaker) = &dependency.circuit_breaker {
            validate_circuit_breaker(&format!("{}.circuit_breaker", prefix), breaker, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_retries(prefix: &str, retries: &RetrySettings, errors: &mut Vec<ValidationError>) {
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{}.max_attempts", prefix), "must be at least 1"));
    }
    if retries.max_delay_ms < retries.initial_delay_ms {
        errors.push(ValidationError::new(
            format!("{}.max_delay_ms", prefix),
            "must not be lower than initial_delay_ms",
        ));
    }
    if !retries.backoff_multiplier.is_finite() || retries.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            format!("{}.backoff_multiplier", prefix),
            "must be a finite number >= 1.0",
        ));
    }
}

fn validate_circuit_breaker(
    prefix: &str,
    breaker: &CircuitBreakerSettings,
    errors: &mut Vec<ValidationError>,
) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{}.failure_threshold", prefix), "must be at least 1"));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{}.success_threshold", prefix), "must be at least 1"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DependencyConfig;

    fn dependency(name: &str, url: &str) -> DependencyConfig {
        DependencyConfig {
            name: name.to_string(),
            base_url: url.to_string(),
            timeout_ms: 1000,
            retries: None,
            circuit_breaker: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GuardConfig::default();
        config.retries.max_attempts = 0;
        config.retries.initial_delay_ms = 500;
        config.retries.max_delay_ms = 100;
        config.retries.backoff_multiplier = 0.5;
        config.circuit_breaker.failure_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "retries.max_attempts",
                "retries.max_delay_ms",
                "retries.backoff_multiplier",
                "circuit_breaker.failure_threshold",
            ]
        );
    }

    #[test]
    fn test_dependency_checks() {
        let mut config = GuardConfig::default();
        config.dependencies.push(dependency("music-api", "https://music.example.com"));
        config.dependencies.push(dependency("music-api", "not a url"));
        let mut overridden = dependency("llm-chat", "https://llm.example.com");
        overridden.retries = Some(RetrySettings {
            max_attempts: 0,
            ..Default::default()
        });
        config.dependencies.push(overridden);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "dependencies[1].name" && e.message.contains("duplicate")));
        assert!(errors.iter().any(|e| e.field == "dependencies[1].base_url"));
        assert!(errors.iter().any(|e| e.field == "dependencies[2].retries.max_attempts"));
    }

    #[test]
    fn test_admin_checked_only_when_enabled() {
        let mut config = GuardConfig::default();
        config.admin.bind_address = "nowhere".to_string();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "admin.bind_address: not a socket address");
    }
}
