//! Token claims and the verified identity derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject identifier as issued: the identity service uses numeric ids,
/// other issuers use strings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SubjectId {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Text(s) => f.write_str(s),
            SubjectId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Payload of a bearer token issued by the identity service.
///
/// `exp` is enforced by the verifier; the other registered claims are
/// accepted but unused.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenClaims {
    /// Subject as issued by the identity service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SubjectId>,

    /// Standard subject claim, used when `id` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<SubjectId>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    pub exp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

impl TokenClaims {
    /// Subject id, preferring the issuer's `id` claim over `sub`.
    pub fn subject(&self) -> Option<String> {
        self.id
            .as_ref()
            .or(self.sub.as_ref())
            .map(ToString::to_string)
            .filter(|s| !s.is_empty())
    }
}

/// Identity established by a signature-checked token.
///
/// Lives for one request; the gateway never persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl VerifiedIdentity {
    /// Build from verified claims. Returns `None` without a subject.
    pub fn from_claims(claims: TokenClaims) -> Option<Self> {
        let id = claims.subject()?;
        Some(Self {
            id,
            name: claims.name,
            email: claims.email,
            role: claims.role.filter(|r| !r.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(json: serde_json::Value) -> TokenClaims {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn numeric_id_is_rendered_as_decimal() {
        let identity = VerifiedIdentity::from_claims(claims(serde_json::json!({
            "id": 17,
            "name": "Ana",
            "email": "ana@example.com",
            "role": "user",
            "exp": 1_700_003_600u64,
        })))
        .unwrap();

        assert_eq!(identity.id, "17");
        assert_eq!(identity.name, "Ana");
        assert_eq!(identity.role.as_deref(), Some("user"));
    }

    #[test]
    fn falls_back_to_sub() {
        let c = claims(serde_json::json!({ "sub": "user_123", "exp": 1 }));
        assert_eq!(c.subject().as_deref(), Some("user_123"));
    }

    #[test]
    fn id_wins_over_sub() {
        let c = claims(serde_json::json!({ "id": "a", "sub": "b", "exp": 1 }));
        assert_eq!(c.subject().as_deref(), Some("a"));
    }

    #[test]
    fn missing_subject_yields_no_identity() {
        let c = claims(serde_json::json!({ "name": "x", "exp": 1 }));
        assert!(VerifiedIdentity::from_claims(c).is_none());
    }

    #[test]
    fn empty_role_is_treated_as_absent() {
        let c = claims(serde_json::json!({ "id": "a", "role": "", "exp": 1 }));
        assert_eq!(VerifiedIdentity::from_claims(c).unwrap().role, None);
    }
}
