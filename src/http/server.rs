//! HTTP server setup and the request pipeline.
//!
//! # Responsibilities
//! - Create the Axum router: `/health` plus a fallback proxy handler
//! - Wire up middleware (request ID, tracing, admission, CORS, hardening)
//! - Run the pipeline: route → authenticate → propagate → forward / relay
//! - Serve on a listener until shutdown is signalled
//!
//! # Data Flow
//! ```text
//! request
//!     → SetRequestId → Trace → PropagateRequestId
//!     → security headers → CORS (preflights answered here)
//!     → admission (429)
//!     → /health | proxy_handler
//!         → routing table (404)
//!         → upgrade allowed? (400)
//!         → protected? authenticate (503 / 401)
//!         → identity headers
//!         → forward.rs | websocket.rs (503)
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::{apply_identity, authenticate, KeyStore};
use crate::config::GatewayConfig;
use crate::health::health_handler;
use crate::http::forward::Forwarder;
use crate::http::request::is_upgrade_request;
use crate::http::response::GatewayError;
use crate::http::websocket::relay_upgrade;
use crate::observability::metrics;
use crate::routing::{Route, RouteTableError, RoutingTable};
use crate::security::headers::{cors_layer, with_security_headers};
use crate::security::rate_limit::{admission_middleware, AdmissionLimiter};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<RoutingTable>,
    pub keys: Arc<KeyStore>,
    pub forwarder: Forwarder,
    pub services: Arc<BTreeMap<&'static str, String>>,
}

/// The gateway's HTTP front.
pub struct GatewayServer {
    router: Router,
    limiter: Option<Arc<AdmissionLimiter>>,
}

impl GatewayServer {
    /// Build the server. The key store is shared with the key bootstrap.
    pub fn new(config: &GatewayConfig, keys: Arc<KeyStore>) -> Result<Self, RouteTableError> {
        let table = Arc::new(RoutingTable::new(config.routes())?);
        for route in table.routes() {
            tracing::info!(
                route = %route.name,
                prefix = %route.matcher.prefix(),
                target = %route.target,
                protected = route.requires_auth,
                upgrade = route.upgrade,
                "Route installed"
            );
        }

        let state = AppState {
            table,
            keys,
            forwarder: Forwarder::new(&config.timeouts),
            services: Arc::new(config.services.named()),
        };

        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(AdmissionLimiter::from_config(&config.rate_limit)));

        let router = Self::build_router(config, state, limiter.clone());
        Ok(Self { router, limiter })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        limiter: Option<Arc<AdmissionLimiter>>,
    ) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(state);

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, admission_middleware));
        }

        // CORS wraps admission: 429s carry CORS headers and preflights
        // are not counted.
        router = router.layer(cors_layer(&config.security));
        if config.security.enable_headers {
            router = with_security_headers(router);
        }

        router
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// The fully layered router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(limiter) = &self.limiter {
            limiter.clone().spawn_sweeper(shutdown.resubscribe());
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();

    let Some(route) = state.table.match_path(request.uri().path()) else {
        tracing::debug!(path = %request.uri().path(), "No route matched");
        metrics::record_request("none", 404, start);
        return GatewayError::RouteNotFound.into_response();
    };

    let response = match dispatch(&state, route, peer, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    metrics::record_request(&route.name, response.status().as_u16(), start);
    response
}

async fn dispatch(
    state: &AppState,
    route: &Route,
    peer: SocketAddr,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let upgrade = is_upgrade_request(request.headers());
    if upgrade && !route.upgrade {
        return Err(GatewayError::UpgradeNotSupported);
    }

    let identity = if route.requires_auth {
        Some(authenticate(request.headers(), &state.keys)?)
    } else {
        None
    };

    let (mut parts, body) = request.into_parts();
    apply_identity(&mut parts.headers, identity.as_ref());
    if let Some(identity) = identity {
        parts.extensions.insert(identity);
    }

    if upgrade {
        relay_upgrade(route, parts, peer, state.forwarder.connect_timeout()).await
    } else {
        state.forwarder.forward(route, parts, body, peer).await
    }
}
