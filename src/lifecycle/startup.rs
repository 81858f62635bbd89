//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the routing table and HTTP server from validated configuration
//! - Bind the listener
//! - Start the key acquisition loop without waiting for it
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Traffic is accepted before the key is ready; protected routes answer
//!   503 until it is

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::{Acquisition, KeyBootstrap, KeyStore};
use crate::config::GatewayConfig;
use crate::http::GatewayServer;
use crate::lifecycle::Shutdown;
use crate::routing::RouteTableError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Routes(#[from] RouteTableError),

    #[error("failed to build key fetch client: {0}")]
    KeyClient(#[from] reqwest::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Handles to a started gateway.
pub struct RunningGateway {
    pub local_addr: SocketAddr,
    pub keys: Arc<KeyStore>,
    pub server: JoinHandle<std::io::Result<()>>,
    pub key_acquisition: JoinHandle<Acquisition>,
}

/// Bind and start serving. Returns as soon as the listener is up.
pub async fn start(config: &GatewayConfig, shutdown: &Shutdown) -> Result<RunningGateway, StartupError> {
    let keys = Arc::new(KeyStore::new());
    let server = GatewayServer::new(config, keys.clone())?;
    let bootstrap = KeyBootstrap::new(keys.clone(), &config.services.user_service_url, &config.identity)?;

    let bind_error = |source| StartupError::Bind {
        address: config.listener.bind_address.clone(),
        source,
    };
    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    tracing::info!(
        address = %local_addr,
        key_url = %bootstrap.key_url(),
        rate_limit = config.rate_limit.enabled,
        "Listening for connections"
    );

    let key_acquisition = bootstrap.start_acquisition(shutdown.subscribe());
    let server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Ok(RunningGateway {
        local_addr,
        keys,
        server,
        key_acquisition,
    })
}
