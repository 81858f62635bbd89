//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     keys.rs (KeyBootstrap) → fetch public key → KeyStore (write once)
//!
//! Protected request:
//!     verifier.rs (KeyStore ready? → Bearer header → RS256 + exp)
//!         → claims.rs (VerifiedIdentity)
//!         → propagation.rs (x-user-* headers on the forwarded request)
//! ```
//!
//! # Design Decisions
//! - The gateway only ever holds the public half of the signing key
//! - Verification failures never reveal their cause to the client
//! - Identity headers are rewritten on every forward, public or not

pub mod claims;
pub mod error;
pub mod keys;
pub mod propagation;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use claims::{TokenClaims, VerifiedIdentity};
pub use error::AuthError;
pub use keys::{Acquisition, KeyBootstrap, KeyFetchError, KeyStore, VerificationKey};
pub use propagation::apply_identity;
pub use verifier::{authenticate, verify_token};
