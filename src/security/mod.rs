//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP admission, before anything else)
//!     → headers.rs (CORS preflight, hardening headers on the response)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Admission knows nothing about authentication
//! - Fail closed: reject on any security check failure
//! - No trust in client-supplied identity or forwarding headers

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{Admission, AdmissionLimiter};
