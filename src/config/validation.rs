//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (the loader handles syntactic parsing)
//! - Service addresses must be absolute `http://` URLs (the forwarder
//!   speaks plaintext HTTP and `ws://` only)
//! - Value ranges (window > 0, ceiling > 0)
//! - Route table integrity (no entry shadowed by an earlier prefix)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::routing::{RouteTableError, RoutingTable};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("identity.public_key_path must start with '/'")]
    RelativeKeyPath,

    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("routing table: {0}")]
    Routes(#[from] RouteTableError),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config
        .listener
        .bind_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if let Some(address) = &config.observability.metrics_address {
        if address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::MetricsAddress(address.clone()));
        }
    }

    let services = &config.services;
    check_url("services.user_service_url", &services.user_service_url, &mut errors);
    check_url("services.graphql_service_url", &services.graphql_service_url, &mut errors);
    if let Some(url) = &services.order_service_url {
        check_url("services.order_service_url", url, &mut errors);
    }
    if let Some(url) = &services.notification_service_url {
        check_url("services.notification_service_url", url, &mut errors);
    }

    if !config.identity.public_key_path.starts_with('/') {
        errors.push(ValidationError::RelativeKeyPath);
    }
    if config.identity.retry_delay_secs == 0 {
        errors.push(ValidationError::Zero { field: "identity.retry_delay_secs" });
    }
    if config.identity.max_attempts == Some(0) {
        errors.push(ValidationError::Zero { field: "identity.max_attempts" });
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.window_secs" });
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.max_requests" });
    }
    if config.rate_limit.max_tracked_origins == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.max_tracked_origins" });
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.connect_secs" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }

    // Only meaningful once the addresses themselves are sound.
    if errors.is_empty() {
        if let Err(e) = RoutingTable::new(config.routes()) {
            errors.push(e.into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidUrl {
            field,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        }),
        Ok(url) if url.host_str().is_none() => errors.push(ValidationError::InvalidUrl {
            field,
            reason: "missing host".into(),
        }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUrl {
            field,
            reason: e.to_string(),
        }),
    }
}
