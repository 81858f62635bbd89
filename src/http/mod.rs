//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, pipeline)
//!     → [routing table decides target]
//!     → [auth decides identity]
//!     → request.rs (hop-by-hop, Host, X-Forwarded-*)
//!     → forward.rs (HTTP) | websocket.rs (upgrade relay)
//!     → response.rs (gateway refusals)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::Forwarder;
pub use response::GatewayError;
pub use server::{AppState, GatewayServer, X_REQUEST_ID};
