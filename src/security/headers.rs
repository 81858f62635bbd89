//! Response hardening and CORS.
//!
//! # Responsibilities
//! - Add security response headers (optional)
//! - Answer CORS preflights for the configured browser origins
//!
//! # Design Decisions
//! - Headers a backend already set are left alone
//! - CORS allows credentials, so origins, methods and headers are never
//!   wildcards; methods and headers mirror the preflight request

use axum::{
    http::{HeaderName, HeaderValue},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

use crate::config::SecurityConfig;

/// Headers added to every response when hardening is enabled.
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
];

/// Layer the security headers onto `router`.
pub fn with_security_headers<S>(mut router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }
    router
}

/// CORS layer for the configured origin allow-list.
pub fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                tracing::warn!("Ignoring wildcard CORS origin; credentials are allowed");
                return None;
            }
            HeaderValue::from_str(origin)
                .inspect_err(|_| tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
