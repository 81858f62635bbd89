//! Configuration loading from the environment.
//!
//! Variables are read exactly once at startup. A `.env` file in the working
//! directory is honoured when present; real environment variables win.

use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl GatewayConfig {
    /// Read and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_from_env()
    }
}

/// Load `.env` (if any) and then the process environment.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    let _ = dotenvy::dotenv();
    load_from(|key| std::env::var(key).ok())
}

/// Load and validate configuration from an arbitrary variable source.
pub fn load_from<F>(lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars { lookup };
    let mut config = GatewayConfig::default();

    let host = vars.string("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port: u16 = vars.parsed("PORT")?.unwrap_or(3000);
    config.listener.bind_address = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    if let Some(url) = vars.string("REST_API_URL") {
        config.services.user_service_url = url;
    }
    if let Some(url) = vars.string("GRAPHQL_API_URL") {
        config.services.graphql_service_url = url;
    }
    config.services.order_service_url = vars.string("ORDER_SERVICE_URL");
    config.services.notification_service_url = vars.string("NOTIFICATION_SERVICE_URL");

    if let Some(path) = vars.string("PUBLIC_KEY_PATH") {
        config.identity.public_key_path = path;
    }
    if let Some(secs) = vars.parsed("KEY_RETRY_DELAY_SECS")? {
        config.identity.retry_delay_secs = secs;
    }
    config.identity.max_attempts = vars.parsed("KEY_MAX_ATTEMPTS")?;
    if let Some(secs) = vars.parsed("KEY_FETCH_TIMEOUT_SECS")? {
        config.identity.fetch_timeout_secs = secs;
    }

    if let Some(enabled) = vars.flag("RATE_LIMIT_ENABLED")? {
        config.rate_limit.enabled = enabled;
    }
    if let Some(secs) = vars.parsed("RATE_LIMIT_WINDOW_SECS")? {
        config.rate_limit.window_secs = secs;
    }
    if let Some(max) = vars.parsed("RATE_LIMIT_MAX_REQUESTS")? {
        config.rate_limit.max_requests = max;
    }
    if let Some(max) = vars.parsed("RATE_LIMIT_MAX_ORIGINS")? {
        config.rate_limit.max_tracked_origins = max;
    }

    if let Some(secs) = vars.parsed("UPSTREAM_CONNECT_TIMEOUT_SECS")? {
        config.timeouts.connect_secs = secs;
    }
    if let Some(secs) = vars.parsed("UPSTREAM_REQUEST_TIMEOUT_SECS")? {
        config.timeouts.request_secs = secs;
    }

    if let Some(origins) = vars.string("CORS_ALLOWED_ORIGINS") {
        config.security.cors_allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(enabled) = vars.flag("SECURITY_HEADERS")? {
        config.security.enable_headers = enabled;
    }

    if let Some(format) = vars.string("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: format,
                    reason: "expected `pretty` or `json`".into(),
                })
            }
        };
    }
    config.observability.metrics_address = vars.string("METRICS_ADDRESS");

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value of a variable.
    fn string(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(var) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, var: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.string(var) {
            None => Ok(None),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::Invalid {
                    var,
                    value,
                    reason: "expected a boolean".into(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.services.user_service_url, "http://rest-api:4000");
        assert_eq!(config.identity.retry_delay_secs, 5);
        assert_eq!(config.identity.max_attempts, None);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.rate_limit.max_requests, 100);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = load(&[
            ("PORT", "8080"),
            ("REST_API_URL", "http://127.0.0.1:4000"),
            ("ORDER_SERVICE_URL", "http://127.0.0.1:5002"),
            ("KEY_MAX_ATTEMPTS", "12"),
            ("RATE_LIMIT_ENABLED", "false"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.services.user_service_url, "http://127.0.0.1:4000");
        assert_eq!(config.services.order_service_url.as_deref(), Some("http://127.0.0.1:5002"));
        assert_eq!(config.identity.max_attempts, Some(12));
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.security.cors_allowed_origins, ["http://a.test", "http://b.test"]);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn ipv6_bind_host_is_bracketed() {
        let config = load(&[("BIND_HOST", "::"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.listener.bind_address, "[::]:8080");

        let config = load(&[("BIND_HOST", "[::1]")]).unwrap();
        assert_eq!(config.listener.bind_address, "[::1]:3000");
    }

    #[test]
    fn bad_metrics_address_fails_validation() {
        let err = load(&[("METRICS_ADDRESS", "localhost")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(load(&[("METRICS_ADDRESS", "0.0.0.0:9100")]).is_ok());
    }

    #[test]
    fn bad_service_url_fails_validation() {
        let err = load(&[("GRAPHQL_API_URL", "not a url")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
