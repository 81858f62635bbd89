//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Establish the WebSocket connection to the backend first
//! - Complete the upgrade handshake with the client only once the backend
//!   accepted, so a dead backend is reported as 503 instead of a dropped
//!   socket
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions; when either side ends,
//!   the other is closed
//! - The subprotocol chosen by the backend is the one offered to the client

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{
        ws::{self, WebSocket, WebSocketUpgrade},
        FromRequestParts,
    },
    http::{header, request::Parts, HeaderName},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{
        self,
        client::IntoClientRequest,
        protocol::{frame::coding::CloseCode, CloseFrame},
    },
    MaybeTlsStream, WebSocketStream,
};

use crate::http::forward::upstream_uri;
use crate::http::request::prepare_forward_headers;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::resilience::timeouts::{with_timeout, TimeoutError};
use crate::routing::Route;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake headers generated per connection by the WebSocket client.
const HANDSHAKE_HEADERS: [HeaderName; 4] = [
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::SEC_WEBSOCKET_ACCEPT,
];

/// Relay an upgrade request whose identity headers are already in place.
pub async fn relay_upgrade(
    route: &Route,
    mut parts: Parts,
    peer: SocketAddr,
    connect_timeout: Duration,
) -> Result<Response, GatewayError> {
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let (upstream, protocol) = connect_upstream(route, &parts, peer, connect_timeout).await?;

    let upgrade = match protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    let route_name = route.name.clone();
    Ok(upgrade.on_upgrade(move |client| relay(client, upstream, route_name)))
}

async fn connect_upstream(
    route: &Route,
    parts: &Parts,
    peer: SocketAddr,
    connect_timeout: Duration,
) -> Result<(UpstreamSocket, Option<String>), GatewayError> {
    let uri = upstream_uri(route, &parts.uri)?;
    let authority = uri.authority().cloned().ok_or_else(|| handshake_failed(route, "no authority"))?;
    let ws_url = format!(
        "ws://{}{}",
        authority,
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );

    let mut headers = parts.headers.clone();
    prepare_forward_headers(&mut headers, &authority, peer);
    for name in &HANDSHAKE_HEADERS {
        headers.remove(name);
    }

    let mut request = ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| handshake_failed(route, &e.to_string()))?;

    // The handshake writer only accepts visible ASCII header values.
    let mut current: Option<HeaderName> = None;
    for (name, value) in headers {
        if let Some(name) = name {
            request.headers_mut().remove(&name);
            current = Some(name);
        }
        let Some(name) = &current else { continue };
        if value.to_str().is_err() {
            tracing::debug!(header = %name, "Dropping non-ASCII header from WebSocket handshake");
            continue;
        }
        request.headers_mut().append(name.clone(), value);
    }

    tracing::debug!(route = %route.name, url = %ws_url, "Opening upstream WebSocket");

    match with_timeout(connect_timeout, tokio_tungstenite::connect_async(request)).await {
        Ok((socket, response)) => {
            let protocol = response
                .headers()
                .get(header::SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok((socket, protocol))
        }
        Err(TimeoutError::Elapsed(limit)) => {
            Err(handshake_failed(route, &format!("timed out after {limit:?}")))
        }
        Err(TimeoutError::Inner(e)) => Err(handshake_failed(route, &e.to_string())),
    }
}

fn handshake_failed(route: &Route, reason: &str) -> GatewayError {
    tracing::error!(route = %route.name, target = %route.target, error = %reason, "Upstream WebSocket handshake failed");
    metrics::record_upstream_failure(&route.name);
    GatewayError::UpstreamUnavailable {
        route: route.name.clone(),
    }
}

/// Pump frames both ways until either side closes.
async fn relay(client: WebSocket, upstream: UpstreamSocket, route: String) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, ws::Message::Close(_));
            if upstream_tx.send(to_upstream(message)).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, ws::Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => tracing::debug!(route = %route, "Client closed WebSocket"),
        _ = upstream_to_client => tracing::debug!(route = %route, "Upstream closed WebSocket"),
    }
}

fn to_upstream(message: ws::Message) -> tungstenite::Message {
    match message {
        ws::Message::Text(text) => tungstenite::Message::text(text.as_str()),
        ws::Message::Binary(data) => tungstenite::Message::Binary(data),
        ws::Message::Ping(data) => tungstenite::Message::Ping(data),
        ws::Message::Pong(data) => tungstenite::Message::Pong(data),
        ws::Message::Close(frame) => tungstenite::Message::Close(frame.map(|f| CloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

fn to_client(message: tungstenite::Message) -> Option<ws::Message> {
    let message = match message {
        tungstenite::Message::Text(text) => ws::Message::Text(text.as_str().into()),
        tungstenite::Message::Binary(data) => ws::Message::Binary(data),
        tungstenite::Message::Ping(data) => ws::Message::Ping(data),
        tungstenite::Message::Pong(data) => ws::Message::Pong(data),
        tungstenite::Message::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().into(),
        })),
        tungstenite::Message::Frame(_) => return None,
    };
    Some(message)
}
