//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment (+ optional .env)
//!     → loader.rs (read & parse variables)
//!     → validation.rs (semantic checks, route table integrity)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once; there is no hot reload
//! - All fields have defaults matching the reference deployment
//! - Validation separates syntactic (parse) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from, load_from_env, ConfigError};
pub use schema::GatewayConfig;
pub use schema::IdentityConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::RateLimitConfig;
pub use schema::RouteConfig;
pub use schema::SecurityConfig;
pub use schema::ServicesConfig;
pub use schema::TimeoutConfig;
