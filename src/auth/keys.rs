//! Public key bootstrap.
//!
//! The gateway never holds the signing key. At startup it asks the identity
//! service for the matching public key and keeps retrying on a fixed delay
//! until it gets one. Until then every protected route answers
//! "key not ready".
//!
//! # State Machine
//! ```text
//! NotReady ──fetch ok──▶ Ready   (terminal, never reverts)
//!    │  ▲
//!    └──┘ fetch failed → sleep(delay) → retry
//! ```
//!
//! The key is published with a single atomic store into an `ArcSwapOption`;
//! request handlers read it lock-free.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use jsonwebtoken::DecodingKey;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::IdentityConfig;
use crate::observability::metrics;
use crate::resilience::retries::RetryPolicy;

/// Error turning key material into a usable verification key.
#[derive(Debug, Error)]
#[error("public key is not a valid RSA PEM: {0}")]
pub struct InvalidKey(#[from] jsonwebtoken::errors::Error);

/// RS256 public key used to check token signatures.
pub struct VerificationKey {
    pem: String,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Parse PEM-encoded RSA public key material.
    pub fn from_pem(pem: impl Into<String>) -> Result<Self, InvalidKey> {
        let pem = pem.into();
        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())?;
        Ok(Self { pem, decoding_key })
    }

    /// The raw key material as received.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("pem_len", &self.pem.len())
            .finish_non_exhaustive()
    }
}

/// Write-once holder for the verification key.
#[derive(Debug, Default)]
pub struct KeyStore {
    slot: ArcSwapOption<VerificationKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that is ready from the start.
    pub fn with_key(key: VerificationKey) -> Self {
        let store = Self::new();
        store.publish(key);
        store
    }

    /// The held key, or `None` while not ready.
    pub fn current_key(&self) -> Option<Arc<VerificationKey>> {
        self.slot.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Publish the key. Only the first publish wins; later ones are refused.
    pub fn publish(&self, key: VerificationKey) -> bool {
        let previous = self
            .slot
            .compare_and_swap(&None::<Arc<VerificationKey>>, Some(Arc::new(key)));
        let published = previous.is_none();
        if published {
            metrics::record_key_ready(true);
        }
        published
    }
}

/// Why a single fetch attempt failed.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("request to identity service failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("identity service answered {0}")]
    Status(StatusCode),

    #[error("malformed key response: {0}")]
    Body(#[source] reqwest::Error),

    #[error(transparent)]
    Key(#[from] InvalidKey),
}

/// How an acquisition loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Key fetched and published after this many attempts.
    Ready { attempts: u32 },
    /// The configured attempt ceiling was reached.
    GaveUp { attempts: u32 },
    /// Shutdown was signalled first.
    Cancelled,
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    public_key: String,
}

/// Fetches the verification key from the identity service.
pub struct KeyBootstrap {
    store: Arc<KeyStore>,
    client: reqwest::Client,
    key_url: String,
    policy: RetryPolicy,
}

impl KeyBootstrap {
    /// Build a bootstrapper for `<identity_base><public_key_path>`.
    pub fn new(
        store: Arc<KeyStore>,
        identity_base: &str,
        config: &IdentityConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .no_proxy()
            .build()?;

        Ok(Self {
            store,
            client,
            key_url: format!(
                "{}{}",
                identity_base.trim_end_matches('/'),
                config.public_key_path
            ),
            policy: RetryPolicy::from(config),
        })
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key_url(&self) -> &str {
        &self.key_url
    }

    /// Spawn the acquisition loop. Never blocks the caller.
    pub fn start_acquisition(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<Acquisition> {
        tokio::spawn(async move { self.acquire(shutdown).await })
    }

    /// Run the acquisition loop to completion.
    pub async fn acquire(&self, mut shutdown: broadcast::Receiver<()>) -> Acquisition {
        if self.store.is_ready() {
            return Acquisition::Ready { attempts: 0 };
        }
        metrics::record_key_ready(false);

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let result = tokio::select! {
                result = self.fetch_once() => result,
                _ = shutdown.recv() => return Acquisition::Cancelled,
            };

            match result {
                Ok(key) => {
                    metrics::record_key_fetch("success");
                    if !self.store.publish(key) {
                        tracing::debug!("Verification key was already published");
                    }
                    tracing::info!(attempts, url = %self.key_url, "Public key fetched from identity service");
                    return Acquisition::Ready { attempts };
                }
                Err(e) => {
                    metrics::record_key_fetch("failure");

                    if !self.policy.allows_retry(attempts) {
                        tracing::error!(
                            attempts,
                            error = %e,
                            url = %self.key_url,
                            "Giving up on public key fetch; protected routes stay unavailable"
                        );
                        return Acquisition::GaveUp { attempts };
                    }

                    tracing::warn!(
                        attempt = attempts,
                        error = %e,
                        retry_in = ?self.policy.delay,
                        "Failed to fetch public key, retrying"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.delay) => {}
                _ = shutdown.recv() => return Acquisition::Cancelled,
            }
        }
    }

    /// One request to the key distribution endpoint.
    async fn fetch_once(&self) -> Result<VerificationKey, KeyFetchError> {
        let response = self
            .client
            .get(&self.key_url)
            .send()
            .await
            .map_err(KeyFetchError::Request)?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status(response.status()));
        }

        let body: PublicKeyResponse = response.json().await.map_err(KeyFetchError::Body)?;
        Ok(VerificationKey::from_pem(body.public_key)?)
    }
}
