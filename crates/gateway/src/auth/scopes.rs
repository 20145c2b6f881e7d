//! Scope-based authorization.
//!
//! A route lists the scopes that grant access; a token needs ANY ONE of
//! them, not all. There is no all-of mode.

use crate::auth::claims::VerifiedClaims;
use std::sync::Arc;
use thiserror::Error;

/// Scope granting read access to the demo data endpoint.
pub const READ_GENERIC_DATA: &str = "read:generic_data";

/// Set of scopes of which a caller must hold at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredScopes(Arc<[String]>);

impl RequiredScopes {
    /// Require any one of `scopes`.
    pub fn any_of(scopes: &[&str]) -> Self {
        Self(scopes.iter().map(|s| (*s).to_string()).collect())
    }

    /// The listed scopes, in declaration order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// The token holds none of the required scopes.
///
/// `present` is for the audit log only; the HTTP response names the
/// required scopes and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient scope: requires any of [{}], token has [{}]", .required.join(", "), .present.join(", "))]
pub struct InsufficientScope {
    pub required: Vec<String>,
    pub present: Vec<String>,
}

/// Allow iff the token's scopes intersect `required`.
///
/// An empty `required` set can never be satisfied.
///
/// # Errors
///
/// Returns `InsufficientScope` carrying both scope lists on denial.
pub fn authorize(
    claims: &VerifiedClaims,
    required: &RequiredScopes,
) -> Result<(), InsufficientScope> {
    if required.as_slice().iter().any(|scope| claims.has_scope(scope)) {
        tracing::debug!(
            target: "gateway.auth.scopes",
            required = ?required.as_slice(),
            "Scope check passed"
        );
        return Ok(());
    }

    let denial = InsufficientScope {
        required: required.as_slice().to_vec(),
        present: claims.scopes().to_vec(),
    };

    tracing::warn!(
        target: "gateway.auth.scopes",
        required = ?denial.required,
        present = ?denial.present,
        "Access denied: insufficient scope"
    );

    Err(denial)
}
