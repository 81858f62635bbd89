//! Bearer token verification.
//!
//! Checks are evaluated in a fixed order so each failure class maps to
//! exactly one response:
//!
//! 1. key not ready       → 503 `key_not_ready`
//! 2. no Authorization    → 401 `no_token`
//! 3. not `Bearer <tok>`  → 401 `malformed_token`
//! 4. signature / expiry  → 401 `invalid_token`

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, Validation};

use super::claims::{TokenClaims, VerifiedIdentity};
use super::error::AuthError;
use super::keys::{KeyStore, VerificationKey};
use crate::observability::metrics;

/// Tokens are issued with RS256 only.
const TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

/// Authenticate a request against the held key.
pub fn authenticate(headers: &HeaderMap, keys: &KeyStore) -> Result<VerifiedIdentity, AuthError> {
    let result = keys
        .current_key()
        .ok_or(AuthError::KeyNotReady)
        .and_then(|key| {
            let token = bearer_token(headers)?;
            verify_token(token, &key)
        });

    if let Err(e) = &result {
        metrics::record_auth_rejection(e.error_code());
    }
    result
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedToken)?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedToken),
    }
}

/// Verify signature and expiry, then decode the identity.
pub fn verify_token(token: &str, key: &VerificationKey) -> Result<VerifiedIdentity, AuthError> {
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.leeway = 0;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<TokenClaims>(token, key.decoding_key(), &validation).map_err(|e| {
        tracing::debug!(error = %e, "Token verification failed");
        AuthError::InvalidToken
    })?;

    VerifiedIdentity::from_claims(data.claims).ok_or_else(|| {
        tracing::debug!("Token verified but carries no subject");
        AuthError::InvalidToken
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{
        foreign_key_token, identity_key, issue_token, issue_token_with, IDENTITY_PUBLIC_PEM,
    };
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    fn ready_store() -> KeyStore {
        KeyStore::with_key(VerificationKey::from_pem(IDENTITY_PUBLIC_PEM).unwrap())
    }

    #[test]
    fn round_trip_preserves_subject() {
        let token = issue_token("42", Some("admin"));
        let identity = verify_token(&token, &identity_key()).unwrap();

        assert_eq!(identity.id, "42");
        assert_eq!(identity.email, "user42@example.com");
        assert_eq!(identity.name, "User 42");
        assert_eq!(identity.role.as_deref(), Some("admin"));
    }

    #[test]
    fn token_from_another_key_is_invalid() {
        let token = foreign_key_token("42");
        assert_eq!(verify_token(&token, &identity_key()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_token_is_invalid() {
        let now = jsonwebtoken::get_current_timestamp();
        let token = issue_token_with(serde_json::json!({
            "id": "7",
            "email": "e@example.com",
            "name": "E",
            "iat": now - 7200,
            "exp": now - 3600,
        }));
        assert_eq!(verify_token(&token, &identity_key()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn token_without_exp_is_invalid() {
        let token = issue_token_with(serde_json::json!({ "id": "7" }));
        assert_eq!(verify_token(&token, &identity_key()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn garbage_token_is_invalid() {
        assert_eq!(verify_token("abc.def.ghi", &identity_key()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn not_ready_wins_over_missing_token() {
        assert_eq!(
            authenticate(&HeaderMap::new(), &KeyStore::new()),
            Err(AuthError::KeyNotReady)
        );
        let token = issue_token("1", None);
        assert_eq!(
            authenticate(&headers(&format!("Bearer {token}")), &KeyStore::new()),
            Err(AuthError::KeyNotReady)
        );
    }

    #[test]
    fn missing_header_is_no_token() {
        assert_eq!(authenticate(&HeaderMap::new(), &ready_store()), Err(AuthError::MissingToken));
    }

    #[test]
    fn non_bearer_header_is_malformed() {
        let store = ready_store();
        for value in ["Bearer", "Basic dXNlcjpwYXNz", "Bearer a b", "token-without-scheme"] {
            assert_eq!(
                authenticate(&headers(value), &store),
                Err(AuthError::MalformedToken),
                "{value}"
            );
        }
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let token = issue_token("9", None);
        let identity = authenticate(&headers(&format!("bearer {token}")), &ready_store()).unwrap();
        assert_eq!(identity.id, "9");
        assert_eq!(identity.role, None);
    }
}
