//! Request preparation for forwarding.
//!
//! # Responsibilities
//! - Detect protocol upgrade requests
//! - Strip hop-by-hop headers (both directions)
//! - Point `Host` at the target and record the original in `X-Forwarded-*`
//!
//! # Design Decisions
//! - Header mutation works on request parts only; the body is never touched
//! - Existing `X-Forwarded-*` values from clients are replaced, not trusted

use std::net::SocketAddr;

use axum::http::{
    header::{self, HeaderName},
    uri::Authority,
    HeaderMap, HeaderValue,
};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Whether the request asks to switch to the WebSocket protocol.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    connection_upgrade && websocket
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Rewrite headers of a request about to leave for `target`.
pub fn prepare_forward_headers(headers: &mut HeaderMap, target: &Authority, peer: SocketAddr) {
    strip_hop_by_hop(headers);

    let original_host = headers.remove(header::HOST);
    match original_host {
        Some(host) => {
            headers.insert(X_FORWARDED_HOST, host);
        }
        None => {
            headers.remove(X_FORWARDED_HOST);
        }
    }

    if let Ok(host) = HeaderValue::from_str(target.as_str()) {
        headers.insert(header::HOST, host);
    }
    if let Ok(ip) = HeaderValue::from_str(&peer.ip().to_string()) {
        headers.insert(X_FORWARDED_FOR, ip);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
}
