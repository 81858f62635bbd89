//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Public key bootstrap:
//!     → retries.rs (fixed-delay retry policy, optional attempt ceiling)
//!
//! Request to backend:
//!     → timeouts.rs (enforce connect/response deadline)
//!     → On failure: surface `upstream unavailable` to the caller
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only the key bootstrap retries automatically; request failures surface
//!   to the caller, who decides whether to retry
//! - Fixed delay, no backoff growth

pub mod retries;
pub mod timeouts;
