//! Gateway error responses.
//!
//! # Responsibilities
//! - Give every refusal one variant with a fixed status and code
//! - Render refusals as `{ "error": ..., "error_code": ... }`
//!
//! # Design Decisions
//! - Backend connect failures and timeouts both map to 503: the client
//!   cannot act differently on either
//! - Upstream error details go to the log, never to the client

use std::time::Duration;

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::auth::error::{AuthError, ErrorBody};

/// Every way the gateway itself can answer a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Service unavailable")]
    UpstreamUnavailable { route: String },

    #[error("Too many requests from this IP, please try again later.")]
    RateLimited { retry_after: Duration },

    #[error("Route not found")]
    RouteNotFound,

    #[error("This route does not accept protocol upgrades")]
    UpgradeNotSupported,
}

impl GatewayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Auth(e) => e.error_code(),
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::RouteNotFound => "route_not_found",
            GatewayError::UpgradeNotSupported => "upgrade_not_supported",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Auth(e) => e.status_code(),
            GatewayError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::UpgradeNotSupported => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        });
        let mut response = (self.status_code(), body).into_response();

        if let GatewayError::RateLimited { retry_after } = self {
            // Round up so clients never retry inside the window.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        response
    }
}
