//! API gateway library.
//!
//! A single entry point in front of the user, GraphQL, order and
//! notification services: per-IP admission, path-prefix routing, RS256
//! bearer token verification against a key fetched from the identity
//! service, and `x-user-*` identity propagation.

// Core subsystems
pub mod auth;
pub mod config;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
