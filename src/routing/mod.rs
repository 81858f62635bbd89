//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, query)
//!     → table.rs (ordered route lookup)
//!     → matcher.rs (segment-aware prefix match)
//!     → Return: matched Route or NoMatch
//!     → rewrite.rs (static per-route path rewrite for the upstream URL)
//!
//! Route Compilation (at startup):
//!     RouteConfig[] (declaration order)
//!     → Compile matchers, parse targets
//!     → Reject entries shadowed by an earlier prefix
//!     → Freeze as immutable RoutingTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod rewrite;
pub mod table;

pub use matcher::PathPrefixMatcher;
pub use rewrite::PathRewrite;
pub use table::{Route, RouteTableError, RoutingTable};
