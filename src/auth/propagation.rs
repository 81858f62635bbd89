//! Identity propagation to backend services.
//!
//! Backends trust the `x-user-*` headers instead of re-checking tokens, so
//! the gateway is the only party allowed to set them: inbound copies are
//! always removed before the verified identity (if any) is written.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use super::claims::VerifiedIdentity;

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const X_USER_NAME: HeaderName = HeaderName::from_static("x-user-name");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// All identity header names, in the order they are written.
pub const IDENTITY_HEADERS: [HeaderName; 4] = [X_USER_ID, X_USER_EMAIL, X_USER_NAME, X_USER_ROLE];

/// Remove every identity header, including repeated values.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in &IDENTITY_HEADERS {
        headers.remove(name);
    }
}

/// Replace inbound identity headers with the verified identity.
///
/// With `None` (public routes) the request leaves without identity headers.
pub fn apply_identity(headers: &mut HeaderMap, identity: Option<&VerifiedIdentity>) {
    strip_identity_headers(headers);

    let Some(identity) = identity else {
        return;
    };

    let fields = [
        (X_USER_ID, Some(identity.id.as_str())),
        (X_USER_EMAIL, Some(identity.email.as_str())),
        (X_USER_NAME, Some(identity.name.as_str())),
        (X_USER_ROLE, identity.role.as_deref()),
    ];

    for (name, value) in fields {
        let Some(value) = value else { continue };
        match HeaderValue::from_bytes(value.as_bytes()) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => {
                tracing::debug!(header = %name, "Dropping identity header with invalid value");
            }
        }
    }
}
