//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Validation is a pure
//! function that reports every problem, not just the first.

use axum::http::HeaderName;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{GuardConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in a configuration.
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

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    let rl = &config.rate_limit;
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than 0"));
    }
    for (field, limit) in [
        ("rate_limit.privileged_per_window", rl.privileged_per_window),
        ("rate_limit.authenticated_per_window", rl.authenticated_per_window),
        ("rate_limit.anonymous_per_window", rl.anonymous_per_window),
    ] {
        if limit == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if rl.anonymous_per_window > rl.authenticated_per_window
        || rl.authenticated_per_window > rl.privileged_per_window
    {
        errors.push(ValidationError::new(
            "rate_limit",
            "tiers must satisfy anonymous <= authenticated <= privileged",
        ));
    }

    let csrf = &config.csrf;
    if csrf.header_names.is_empty() {
        errors.push(ValidationError::new("csrf.header_names", "at least one header is required"));
    }
    for name in &csrf.header_names {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "csrf.header_names",
                format!("invalid header name {:?}", name),
            ));
        }
    }
    if csrf.body_field.is_empty() {
        errors.push(ValidationError::new("csrf.body_field", "must not be empty"));
    }
    if csrf.cookie_name.is_empty() {
        errors.push(ValidationError::new("csrf.cookie_name", "must not be empty"));
    }
    for rule in &csrf.routes {
        if !rule.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(
                "csrf.routes",
                format!("path prefix {:?} must start with '/'", rule.path_prefix),
            ));
        }
    }

    let monitor = &config.auth_monitor;
    if !monitor.path_prefix.starts_with('/') {
        errors.push(ValidationError::new("auth_monitor.path_prefix", "must start with '/'"));
    }
    if monitor.rollup_interval_secs == 0 {
        errors.push(ValidationError::new("auth_monitor.rollup_interval_secs", "must be greater than 0"));
    }

    if config.session.cookie_name.is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    } else if config.session.cookie_name == csrf.cookie_name {
        errors.push(ValidationError::new(
            "session.cookie_name",
            "must differ from csrf.cookie_name",
        ));
    }
    if config.session.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("session.idle_timeout_secs", "must be greater than 0"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("session.sweep_interval_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set to a real secret when the admin API is enabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, address: &str) {
    if address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address {:?}", address)));
    }
}
