//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the matching route for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - First match wins; construction rejects any entry shadowed by an
//!   earlier, broader prefix so declaration order can never hide a route
//! - O(n) path prefix scan (acceptable for typical route counts)

use thiserror::Error;
use url::Url;

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;
use crate::routing::rewrite::PathRewrite;

/// Error building the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTableError {
    #[error("route `{route}`: prefix {prefix:?} must start with '/'")]
    InvalidPrefix { route: String, prefix: String },

    #[error("route `{route}`: target {target:?} is not a valid base address")]
    InvalidTarget { route: String, target: String },

    #[error("route `{route}` is declared twice")]
    DuplicateName { route: String },

    #[error("route `{route}` ({prefix}) is unreachable: shadowed by `{by}` ({by_prefix})")]
    Shadowed {
        route: String,
        prefix: String,
        by: String,
        by_prefix: String,
    },
}

/// A compiled routing table entry.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub matcher: PathPrefixMatcher,
    /// Target base address without a trailing slash.
    pub target: String,
    pub rewrite: PathRewrite,
    pub requires_auth: bool,
    pub upgrade: bool,
}

impl Route {
    fn compile(config: RouteConfig) -> Result<Self, RouteTableError> {
        let matcher = PathPrefixMatcher::new(config.path_prefix.clone()).ok_or_else(|| {
            RouteTableError::InvalidPrefix {
                route: config.name.clone(),
                prefix: config.path_prefix.clone(),
            }
        })?;

        let invalid_target = || RouteTableError::InvalidTarget {
            route: config.name.clone(),
            target: config.target.clone(),
        };
        let url = Url::parse(&config.target).map_err(|_| invalid_target())?;
        // Upstream connections are plaintext HTTP and `ws://` only.
        if url.scheme() != "http" || url.host_str().is_none() {
            return Err(invalid_target());
        }

        Ok(Self {
            target: config.target.trim_end_matches('/').to_string(),
            name: config.name,
            matcher,
            rewrite: config.rewrite,
            requires_auth: config.requires_auth,
            upgrade: config.upgrade,
        })
    }

    /// Path and query to request from the target.
    pub fn upstream_path(&self, path: &str, query: Option<&str>) -> String {
        let path = self.rewrite.apply(&self.matcher, path);
        match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path,
        }
    }

    /// Absolute URL on the target for the given inbound path and query.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        format!("{}{}", self.target, self.upstream_path(path, query))
    }
}

/// Ordered, immutable routing table.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    /// Compile routes, rejecting invalid or unreachable entries.
    pub fn new(configs: Vec<RouteConfig>) -> Result<Self, RouteTableError> {
        let mut routes: Vec<Route> = Vec::with_capacity(configs.len());

        for config in configs {
            let route = Route::compile(config)?;

            if routes.iter().any(|r| r.name == route.name) {
                return Err(RouteTableError::DuplicateName { route: route.name });
            }

            if let Some(earlier) = routes.iter().find(|r| r.matcher.covers(&route.matcher)) {
                return Err(RouteTableError::Shadowed {
                    route: route.name,
                    prefix: route.matcher.prefix().to_string(),
                    by: earlier.name.clone(),
                    by_prefix: earlier.matcher.prefix().to_string(),
                });
            }

            routes.push(route);
        }

        Ok(Self { routes })
    }

    /// First route whose prefix matches `path`.
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(path))
    }

    /// All routes in match order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
