//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! Every value is read from the environment once at startup; see `loader.rs`
//! for the variable names. All types derive Serde traits so the resolved
//! configuration can be printed by the operator CLI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::routing::PathRewrite;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Base addresses of the backend services.
    pub services: ServicesConfig,

    /// Public key bootstrap settings.
    pub identity: IdentityConfig,

    /// Admission (rate limiting) configuration.
    pub rate_limit: RateLimitConfig,

    /// Upstream timeout configuration.
    pub timeouts: TimeoutConfig,

    /// CORS and response hardening.
    pub security: SecurityConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Build the ordered route list for the configured services.
    ///
    /// Order matters: the routing table is first-match-wins.
    pub fn routes(&self) -> Vec<RouteConfig> {
        let user = &self.services.user_service_url;
        let mut routes = vec![
            RouteConfig::public("auth", "/api/auth", user),
            RouteConfig::protected("users", "/api/users", user),
            RouteConfig::protected("medical-history", "/api/medical-history", user),
            RouteConfig {
                upgrade: true,
                ..RouteConfig::protected("graphql", "/graphql", &self.services.graphql_service_url)
            },
        ];

        if let Some(orders) = &self.services.order_service_url {
            routes.push(RouteConfig {
                rewrite: PathRewrite::StripPrefix,
                ..RouteConfig::protected("store", "/api/store", orders)
            });
        }

        if let Some(notifications) = &self.services.notification_service_url {
            routes.push(RouteConfig {
                rewrite: PathRewrite::StripPrefix,
                ..RouteConfig::protected("notifications", "/api/notifications", notifications)
            });
        }

        routes
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Backend service base addresses.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// User service; also the identity service that owns the signing key.
    pub user_service_url: String,

    /// GraphQL service (queries and subscriptions).
    pub graphql_service_url: String,

    /// Order (store) service. The route is only installed when set.
    pub order_service_url: Option<String>,

    /// Notification (reminder) service. The route is only installed when set.
    pub notification_service_url: Option<String>,
}

impl ServicesConfig {
    /// Configured services by name, as reported by the liveness endpoint.
    pub fn named(&self) -> BTreeMap<&'static str, String> {
        let mut services = BTreeMap::from([
            ("user", self.user_service_url.clone()),
            ("graphql", self.graphql_service_url.clone()),
        ]);
        if let Some(url) = &self.order_service_url {
            services.insert("order", url.clone());
        }
        if let Some(url) = &self.notification_service_url {
            services.insert("notification", url.clone());
        }
        services
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            user_service_url: "http://rest-api:4000".to_string(),
            graphql_service_url: "http://graphql-api:4000".to_string(),
            order_service_url: None,
            notification_service_url: None,
        }
    }
}

/// Public key bootstrap configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path of the key distribution endpoint on the user service.
    pub public_key_path: String,

    /// Fixed delay between failed fetch attempts in seconds.
    pub retry_delay_secs: u64,

    /// Optional ceiling on fetch attempts. `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Timeout for a single fetch attempt in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            public_key_path: "/api/auth/public-key".to_string(),
            retry_delay_secs: 5,
            max_attempts: None,
            fetch_timeout_secs: 10,
        }
    }
}

/// Admission (rate limiting) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per origin per window.
    pub max_requests: u32,

    /// Upper bound on tracked origins before eviction kicks in.
    pub max_tracked_origins: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            max_requests: 100,
            max_tracked_origins: 100_000,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to produce response headers, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security response headers.
    pub enable_headers: bool,

    /// Origins allowed by CORS (credentials are allowed for these).
    pub cors_allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            cors_allowed_origins: vec![
                "http://localhost:3002".to_string(),
                "http://frontend-app:3002".to_string(),
            ],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus exporter bind address. Metrics are disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "api_gateway=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}

/// A single entry of the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match (segment-aware).
    pub path_prefix: String,

    /// Base address of the target service.
    pub target: String,

    /// How the matched path is rewritten before forwarding.
    #[serde(default)]
    pub rewrite: PathRewrite,

    /// Whether a verified bearer token is required.
    #[serde(default)]
    pub requires_auth: bool,

    /// Whether WebSocket upgrades are relayed on this route.
    #[serde(default)]
    pub upgrade: bool,
}

impl RouteConfig {
    /// A route reachable without a token.
    pub fn public(name: &str, path_prefix: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            target: target.to_string(),
            rewrite: PathRewrite::Preserve,
            requires_auth: false,
            upgrade: false,
        }
    }

    /// A route that requires a verified bearer token.
    pub fn protected(name: &str, path_prefix: &str, target: &str) -> Self {
        Self {
            requires_auth: true,
            ..Self::public(name, path_prefix, target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_cover_core_services() {
        let config = GatewayConfig::default();
        let routes = config.routes();
        let names: Vec<_> = routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["auth", "users", "medical-history", "graphql"]);

        assert!(!routes[0].requires_auth);
        assert!(routes[1..].iter().all(|r| r.requires_auth));
        assert_eq!(routes.iter().filter(|r| r.upgrade).count(), 1);
        assert!(routes[3].upgrade);
    }

    #[test]
    fn optional_services_add_stripped_routes() {
        let mut config = GatewayConfig::default();
        config.services.order_service_url = Some("http://order-service:5002".into());
        config.services.notification_service_url = Some("http://notification-service:5001".into());

        let routes = config.routes();
        let store = routes.iter().find(|r| r.name == "store").unwrap();
        assert_eq!(store.path_prefix, "/api/store");
        assert_eq!(store.rewrite, PathRewrite::StripPrefix);
        assert_eq!(store.target, "http://order-service:5002");

        let notifications = routes.iter().find(|r| r.name == "notifications").unwrap();
        assert_eq!(notifications.rewrite, PathRewrite::StripPrefix);
    }
}
