//! API Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      GATEWAY                          │
//!                      │                                                       │
//!   Client Request     │  ┌──────────┐   ┌─────────┐   ┌──────┐   ┌────────┐  │
//!   ───────────────────┼─▶│admission │──▶│ routing │──▶│ auth │──▶│forward │──┼──▶ user / graphql /
//!                      │  │ (per IP) │   │  table  │   │RS256 │   │ / ws   │  │    order / notification
//!                      │  └──────────┘   └─────────┘   └──┬───┘   └────────┘  │
//!                      │                                  │                    │
//!                      │                          ┌───────┴──────┐             │
//!                      │                          │  key store   │◀── key bootstrap ◀── identity service
//!                      │                          └──────────────┘             │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use api_gateway::config::{GatewayConfig, ObservabilityConfig};
use api_gateway::lifecycle::{self, signals, Shutdown};
use api_gateway::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        user_service = %config.services.user_service_url,
        graphql_service = %config.services.graphql_service_url,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    // Validated by the loader.
    if let Some(addr) = config
        .observability
        .metrics_address
        .as_deref()
        .and_then(|address| address.parse().ok())
    {
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();
    let mut server = lifecycle::start(&config, &shutdown).await?.server;

    let finished = tokio::select! {
        _ = signals::wait_for_shutdown_signal() => None,
        result = &mut server => Some(result),
    };
    shutdown.trigger();

    let result = match finished {
        Some(result) => result,
        None => server.await,
    };
    result??;

    tracing::info!("Shutdown complete");
    Ok(())
}
