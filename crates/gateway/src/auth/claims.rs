//! Verified token claims.
//!
//! [`VerifiedClaims`] is only constructed by the token verifier after the
//! signature and every registered claim have been checked. It is immutable
//! and lives in the request extensions for the duration of one request.
//!
//! The subject is redacted in Debug output to prevent exposure in logs.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Claims of a token that passed verification.
#[derive(Clone)]
pub struct VerifiedClaims {
    subject: String,
    issuer: String,
    audience: BTreeSet<String>,
    expires_at: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
    scope: Vec<String>,
    raw: Map<String, Value>,
}

/// Custom Debug implementation that redacts the subject.
impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expires_at", &self.expires_at)
            .field("not_before", &self.not_before)
            .field("scope", &self.scope)
            .field("raw", &self.raw.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VerifiedClaims {
    pub(crate) fn new(
        subject: String,
        issuer: String,
        audience: BTreeSet<String>,
        expires_at: DateTime<Utc>,
        not_before: Option<DateTime<Utc>>,
        scope: Vec<String>,
        raw: Map<String, Value>,
    ) -> Self {
        Self {
            subject,
            issuer,
            audience,
            expires_at,
            not_before,
            scope,
            raw,
        }
    }

    /// Subject (`sub`).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer (`iss`).
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audiences (`aud`), normalised to a set.
    pub fn audience(&self) -> &BTreeSet<String> {
        &self.audience
    }

    /// Expiry (`exp`).
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Not-before (`nbf`), if the token carried one.
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// Granted scopes, in token order.
    pub fn scopes(&self) -> &[String] {
        &self.scope
    }

    /// Granted scopes joined back into the space-delimited claim form.
    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }

    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    /// Every claim other than `iss`, `sub`, `aud`, `exp`, `nbf` and `scope`.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}
