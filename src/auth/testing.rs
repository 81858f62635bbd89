//! Key material and token helpers for unit tests.

use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde::Serialize;

use super::keys::VerificationKey;

pub const IDENTITY_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/identity_public.pem");
pub const IDENTITY_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/identity_private.pem");
pub const FOREIGN_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/foreign_public.pem");
pub const FOREIGN_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/foreign_private.pem");

pub fn identity_key() -> VerificationKey {
    VerificationKey::from_pem(IDENTITY_PUBLIC_PEM).unwrap()
}

fn sign<T: Serialize>(claims: &T, private_pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

fn standard_claims(id: &str, role: Option<&str>) -> serde_json::Value {
    let now = get_current_timestamp();
    let mut claims = serde_json::json!({
        "id": id,
        "email": format!("user{id}@example.com"),
        "name": format!("User {id}"),
        "iat": now,
        "exp": now + 3600,
    });
    if let Some(role) = role {
        claims["role"] = role.into();
    }
    claims
}

/// A one-hour token signed by the identity key.
pub fn issue_token(id: &str, role: Option<&str>) -> String {
    sign(&standard_claims(id, role), IDENTITY_PRIVATE_PEM)
}

/// Sign arbitrary claims with the identity key.
pub fn issue_token_with(claims: serde_json::Value) -> String {
    sign(&claims, IDENTITY_PRIVATE_PEM)
}

/// A well-formed token signed by a key the gateway does not trust.
pub fn foreign_key_token(id: &str) -> String {
    sign(&standard_claims(id, None), FOREIGN_PRIVATE_PEM)
}
