//! Configuration validation.
//!
//! Serde handles the syntactic checks; this module checks values that
//! parse fine but cannot be served. All problems are reported at once.

use std::net::SocketAddr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.address `{0}` is not a valid host:port authority")]
    InvalidUpstream(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("middleware.name must not be empty")]
    EmptyMiddlewareName,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let upstream = &config.upstream.address;
    if upstream.is_empty() || upstream.parse::<Authority>().is_err() {
        errors.push(ValidationError::InvalidUpstream(upstream.clone()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.middleware.name.is_empty() {
        errors.push(ValidationError::EmptyMiddlewareName);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
