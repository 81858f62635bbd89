//! Plain HTTP forwarding to a route's target.
//!
//! # Responsibilities
//! - Build the upstream URI from the route's rewrite rule
//! - Relay the request body as a stream, without buffering
//! - Bound each forward by connect and response timeouts
//!
//! # Design Decisions
//! - One pooled hyper client shared by all routes
//! - No retries: a failed forward is answered with 503 immediately
//! - If the client goes away, the handler future (and with it the
//!   upstream request) is dropped

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{request::Parts, Request, Uri, Version},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TimeoutConfig;
use crate::http::request::{prepare_forward_headers, strip_hop_by_hop};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::resilience::timeouts::{with_timeout, TimeoutError};
use crate::routing::Route;

/// Shared upstream HTTP client.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Forwarder {
    pub fn new(config: &TimeoutConfig) -> Self {
        let connect_timeout = Duration::from_secs(config.connect_secs);
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            connect_timeout,
            request_timeout: Duration::from_secs(config.request_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Forward a request whose identity headers are already in place.
    pub async fn forward(
        &self,
        route: &Route,
        mut parts: Parts,
        body: Body,
        peer: SocketAddr,
    ) -> Result<Response, GatewayError> {
        let uri = upstream_uri(route, &parts.uri)?;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| unavailable(route, "target has no authority"))?;

        prepare_forward_headers(&mut parts.headers, &authority, peer);
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        let request = Request::from_parts(parts, body);
        tracing::debug!(route = %route.name, uri = %request.uri(), "Forwarding request");

        match with_timeout(self.request_timeout, self.client.request(request)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(TimeoutError::Elapsed(limit)) => {
                tracing::warn!(route = %route.name, timeout = ?limit, "Upstream timed out");
                metrics::record_upstream_failure(&route.name);
                Err(GatewayError::UpstreamUnavailable { route: route.name.clone() })
            }
            Err(TimeoutError::Inner(e)) => Err(unavailable(route, &e.to_string())),
        }
    }
}

/// Absolute URI on the route's target for an inbound request URI.
pub fn upstream_uri(route: &Route, inbound: &Uri) -> Result<Uri, GatewayError> {
    route
        .upstream_url(inbound.path(), inbound.query())
        .parse::<Uri>()
        .map_err(|e| unavailable(route, &e.to_string()))
}

fn unavailable(route: &Route, reason: &str) -> GatewayError {
    tracing::error!(route = %route.name, target = %route.target, error = %reason, "Upstream unavailable");
    metrics::record_upstream_failure(&route.name);
    GatewayError::UpstreamUnavailable {
        route: route.name.clone(),
    }
}
