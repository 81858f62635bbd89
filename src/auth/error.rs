//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Reasons a protected route refuses a request.
///
/// `KeyNotReady` is transient and answered with 503 so clients can tell
/// "try again shortly" apart from "your credentials are wrong".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Service unavailable. Public key not yet fetched.")]
    KeyNotReady,

    #[error("No token provided")]
    MissingToken,

    #[error("Malformed token")]
    MalformedToken,

    /// Bad signature, expired, wrong algorithm or unusable payload.
    /// The cause is deliberately not exposed.
    #[error("Invalid token")]
    InvalidToken,
}

#[derive(Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
    pub error_code: &'static str,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::KeyNotReady => "key_not_ready",
            AuthError::MissingToken => "no_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidToken => "invalid_token",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::KeyNotReady => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::MissingToken | AuthError::MalformedToken | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        });
        (self.status_code(), body).into_response()
    }
}
