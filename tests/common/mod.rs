//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::auth::KeyStore;
use api_gateway::config::GatewayConfig;
use api_gateway::lifecycle::{self, Shutdown};
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub const IDENTITY_PUBLIC_PEM: &str = include_str!("../fixtures/identity_public.pem");
pub const IDENTITY_PRIVATE_PEM: &str = include_str!("../fixtures/identity_private.pem");
pub const FOREIGN_PRIVATE_PEM: &str = include_str!("../fixtures/foreign_private.pem");

/// An address nothing listens on.
pub const DEAD_BACKEND: &str = "http://127.0.0.1:9";

async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn serve(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// Start a raw TCP backend that returns a fixed response and closes.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let (listener, addr) = bind_local().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that accepts connections and never answers.
pub async fn start_stalled_backend() -> SocketAddr {
    let (listener, addr) = bind_local().await;

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Reports what the backend received: method, path, query, headers, body.
async fn echo(request: Request<Body>) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut headers = serde_json::Map::new();
    for (name, value) in parts.headers.iter() {
        let entry = headers
            .entry(name.as_str().to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()));
        }
    }

    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body_len": body.len(),
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Start an HTTP backend that echoes every request as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    let (listener, addr) = bind_local().await;
    serve(listener, Router::new().fallback(echo));
    addr
}

#[derive(Clone)]
struct IdentityState {
    failures: u32,
    attempts: Arc<AtomicU32>,
}

async fn public_key(State(state): State<IdentityState>) -> Response {
    let attempt = state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt <= state.failures {
        return (StatusCode::INTERNAL_SERVER_ERROR, "key store warming up").into_response();
    }
    Json(json!({ "publicKey": IDENTITY_PUBLIC_PEM })).into_response()
}

/// Start a user service: the key endpoint fails `failures` times before
/// serving the key; every other path is echoed.
///
/// Returns the address and the key fetch counter.
pub async fn start_user_service(failures: u32) -> (SocketAddr, Arc<AtomicU32>) {
    let attempts = Arc::new(AtomicU32::new(0));
    let state = IdentityState {
        failures,
        attempts: attempts.clone(),
    };

    let app = Router::new()
        .route("/api/auth/public-key", get(public_key))
        .with_state(state)
        .fallback(echo);

    let (listener, addr) = bind_local().await;
    serve(listener, app);
    (addr, attempts)
}

async fn ws_greeter(ws: WebSocketUpgrade, headers: HeaderMap) -> Response {
    let user = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    ws.protocols(["graphql-ws"]).on_upgrade(move |mut socket| async move {
        if socket.send(Message::Text(format!("hello {user}").into())).await.is_err() {
            return;
        }
        while let Some(Ok(message)) = socket.recv().await {
            match message {
                Message::Text(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
}

/// Start a WebSocket backend on `/graphql` that greets the propagated
/// user id and then echoes text frames.
pub async fn start_ws_backend() -> SocketAddr {
    let (listener, addr) = bind_local().await;
    serve(listener, Router::new().route("/graphql", any(ws_greeter)));
    addr
}

fn sign(claims: &Value, private_pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

fn claims(id: u64, role: &str) -> Value {
    let now = get_current_timestamp();
    json!({
        "id": id,
        "email": format!("user{id}@example.com"),
        "name": format!("User {id}"),
        "role": role,
        "iat": now,
        "exp": now + 3600,
    })
}

/// A valid token as the identity service would issue it.
pub fn issue_token(id: u64, role: &str) -> String {
    sign(&claims(id, role), IDENTITY_PRIVATE_PEM)
}

/// A well-formed token signed by an untrusted key.
pub fn foreign_token(id: u64) -> String {
    sign(&claims(id, "user"), FOREIGN_PRIVATE_PEM)
}

/// A correctly signed token that expired an hour ago.
pub fn expired_token(id: u64) -> String {
    let mut claims = claims(id, "user");
    let now = get_current_timestamp();
    claims["iat"] = json!(now - 7200);
    claims["exp"] = json!(now - 3600);
    sign(&claims, IDENTITY_PRIVATE_PEM)
}

/// Gateway configuration on an ephemeral port pointing at the given services.
pub fn gateway_config(user_service: &str, graphql_service: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.services.user_service_url = user_service.to_string();
    config.services.graphql_service_url = graphql_service.to_string();
    config.identity.retry_delay_secs = 1;
    config.identity.fetch_timeout_secs = 2;
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub keys: Arc<KeyStore>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for the verification key, failing the test after `limit`.
    pub async fn wait_until_ready(&self, limit: Duration) {
        let deadline = tokio::time::Instant::now() + limit;
        while !self.keys.is_ready() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "verification key not fetched within {limit:?}"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway in-process.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let shutdown = Shutdown::new();
    let running = lifecycle::start(&config, &shutdown).await.unwrap();
    TestGateway {
        addr: running.local_addr,
        keys: running.keys,
        shutdown,
    }
}

/// Start a gateway whose key is fetched from a healthy user service.
pub async fn start_ready_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = start_gateway(config).await;
    gateway.wait_until_ready(Duration::from_secs(5)).await;
    gateway
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// All values the echo backend saw for a header.
pub fn header_values(echo: &Value, name: &str) -> Vec<String> {
    echo["headers"][name]
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
