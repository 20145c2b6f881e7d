//! JWT utilities shared across the gateway.
//!
//! This module provides the pieces of token validation that do not depend on
//! key material:
//! - Size limits for DoS prevention
//! - Clock skew constants for `exp`/`nbf` validation
//! - Unverified header decoding (`alg` and `kid`) for key selection
//! - Time-claim checks with an explicit `now` for deterministic tests
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header is decoded without trusting any payload claim
//! - Error messages are generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_unverified_header, validate_exp_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_unverified_header(token)?;
//! if !allowed.contains(&header.alg) {
//!     return Err(...);
//! }
//!
//! // After signature verification
//! validate_exp_at(claims.exp, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Identity-provider access tokens are typically
/// well under 2KB, even with a long scope list.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (1 minute).
///
/// Applied symmetrically to `exp` and `nbf`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Caps misconfiguration that would otherwise keep expired tokens alive.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before or after signature checks.
///
/// Note: Display text is intentionally generic. Callers log the variant
/// at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid compact JWS structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header is missing the `alg` field.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,

    /// Token header is missing the `kid` field.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `exp` is in the past by more than the clock skew.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `nbf` is in the future by more than the clock skew.
    #[error("The access token is invalid or expired")]
    NotYetValid,
}

// =============================================================================
// Header
// =============================================================================

/// The two header fields needed before a signature can be checked.
///
/// Nothing in here is trusted: `alg` is checked against an allow-list and
/// `kid` is only ever used as a lookup key into a trusted key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Declared signing algorithm, verbatim (e.g. `RS256`, `none`).
    pub alg: String,

    /// Key identifier.
    pub kid: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<serde_json::Value>,
    #[serde(default)]
    kid: Option<serde_json::Value>,
}

/// Decode the JWT header without verifying the signature.
///
/// The algorithm is returned as a plain string so that values the JWT
/// library does not model (such as `none`) can still be rejected by the
/// caller's allow-list instead of failing as a parse error.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong number of segments, bad base64, or invalid JSON
/// - `MissingAlgorithm` - `alg` absent, empty, or not a string
/// - `MissingKid` - `kid` absent, empty, or not a string
pub fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = non_empty_string(header.alg).ok_or(JwtValidationError::MissingAlgorithm)?;
    let kid = non_empty_string(header.kid).ok_or(JwtValidationError::MissingKid)?;

    Ok(UnverifiedHeader { alg, kid })
}

fn non_empty_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

// =============================================================================
// Time claims
// =============================================================================

/// Deterministic `exp` validation against an explicit `now` timestamp.
///
/// A token whose `exp` is exactly `clock_skew` seconds in the past is still
/// accepted; one second more is rejected.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` when `exp + clock_skew < now`.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let skew = skew_secs(clock_skew);
    if exp.saturating_add(skew) < now {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = skew,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }
    Ok(())
}

/// Deterministic `nbf` validation against an explicit `now` timestamp.
///
/// # Errors
///
/// Returns `JwtValidationError::NotYetValid` when `nbf - clock_skew > now`.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let skew = skew_secs(clock_skew);
    if nbf.saturating_sub(skew) > now {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            clock_skew_secs = skew,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }
    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
