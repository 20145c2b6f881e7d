//! Authentication pipeline.
//!
//! Turns a raw `Authorization` header value into [`VerifiedClaims`]. Holds
//! no mutable state of its own; the key cache lives in the resolver behind
//! the verifier.

use crate::auth::claims::VerifiedClaims;
use crate::auth::jwt::{TokenVerifier, VerificationError};
use thiserror::Error;
use tracing::instrument;

/// Literal scheme prefix. Case-sensitive, single space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredential,

    #[error("Malformed Authorization header: {0}")]
    MalformedCredential(&'static str),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// Extract the token from an `Authorization` header value.
///
/// # Errors
///
/// - `MissingCredential` - no header
/// - `MalformedCredential` - header does not start with `"Bearer "`
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedCredential("missing 'Bearer ' prefix"))
}

/// Per-request authentication entry point.
pub struct Authenticator {
    verifier: TokenVerifier,
}

impl Authenticator {
    /// Create a new authenticator.
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Underlying token verifier.
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authenticate a raw `Authorization` header value.
    ///
    /// The verifier's result is passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` for a missing or malformed header, or wraps the
    /// `VerificationError` of a rejected token.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, header: Option<&str>) -> Result<VerifiedClaims, AuthError> {
        let token = extract_bearer_token(header)?;
        Ok(self.verifier.verify(token).await?)
    }
}
