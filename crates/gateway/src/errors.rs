//! Gateway error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic; the
//! specific verification failure is logged server-side only.

use crate::auth::{AuthError, InsufficientScope, VerificationError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "gateway";

/// HTTP-facing error type.
///
/// Maps to appropriate HTTP status codes:
/// - MissingCredentials, Unauthorized: 401 Unauthorized (with `WWW-Authenticate`)
/// - Forbidden: 403 Forbidden
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No `Authorization` header; the challenge carries no error code.
    #[error("Unauthorized: Authorization header required")]
    MissingCredentials,

    /// Client-safe message; never contains the verification reason.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: insufficient scope")]
    Forbidden { required: Vec<String> },

    /// Server-side reason, logged and replaced with a generic body.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredentials | GatewayError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => {
                tracing::debug!(target: "gateway.middleware.auth", "Missing Authorization header");
                GatewayError::MissingCredentials
            }
            AuthError::MalformedCredential(reason) => {
                tracing::debug!(target: "gateway.middleware.auth", reason = %reason, "Malformed Authorization header");
                GatewayError::Unauthorized("Malformed Authorization header".to_string())
            }
            AuthError::Verification(VerificationError::KeyFetch(e)) => {
                tracing::error!(target: "gateway.middleware.auth", error = %e, "Signing keys unavailable during verification");
                GatewayError::Unauthorized("Invalid token".to_string())
            }
            AuthError::Verification(e) => {
                tracing::debug!(target: "gateway.middleware.auth", error = %e, "Token validation failed");
                GatewayError::Unauthorized("Invalid token".to_string())
            }
        }
    }
}

impl From<InsufficientScope> for GatewayError {
    fn from(err: InsufficientScope) -> Self {
        GatewayError::Forbidden {
            required: err.required,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message, challenge) = match &self {
            // RFC 6750 3.1: no error code when the request had no credentials
            GatewayError::MissingCredentials => (
                "UNAUTHORIZED",
                "Authorization header required".to_string(),
                Some(format!("Bearer realm=\"{AUTH_REALM}\"")),
            ),
            GatewayError::Unauthorized(message) => (
                "UNAUTHORIZED",
                message.clone(),
                Some(format!(
                    "Bearer realm=\"{AUTH_REALM}\", error=\"invalid_token\""
                )),
            ),
            GatewayError::Forbidden { required } => (
                "INSUFFICIENT_SCOPE",
                format!(
                    "Forbidden: insufficient scope. Requires '{}'",
                    required.join("' or '")
                ),
                Some(format!(
                    "Bearer realm=\"{AUTH_REALM}\", error=\"insufficient_scope\", scope=\"{}\"",
                    required.join(" ")
                )),
            ),
            GatewayError::Internal(reason) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "gateway.errors", reason = %reason, "Internal error");
                (
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let Some(challenge) = challenge {
            if let Ok(header_value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, header_value);
            }
        }

        response
    }
}
