//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed test tokens.

use crate::crypto_fixtures::TestSigningKey;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// Defaults to a token that the gateway accepts for the given issuer and
/// audience: issued now, valid for an hour, with an empty scope.
///
/// # Example
/// ```rust,ignore
/// let key = RsaTestKey::new("rsa-1");
/// let token = TestTokenBuilder::new(&issuer, "https://api.example.com")
///     .for_user("alice")
///     .with_scope("read:generic_data")
///     .sign(&key);
/// ```
pub struct TestTokenBuilder {
    iss: String,
    aud: Value,
    sub: String,
    scope: String,
    iat: i64,
    exp: i64,
    nbf: Option<i64>,
    extra: Map<String, Value>,
    omitted: Vec<String>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            aud: Value::String(audience.to_string()),
            sub: "test-subject".to_string(),
            scope: String::new(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            nbf: None,
            extra: Map::new(),
            omitted: Vec::new(),
        }
    }

    /// Set the subject (user/service)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set the audience as an array
    pub fn audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    /// Set expiration in seconds from now
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// Add or replace an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Drop a claim from the payload entirely
    pub fn without_claim(mut self, name: &str) -> Self {
        self.omitted.push(name.to_string());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("iss".to_string(), Value::String(self.iss));
        claims.insert("sub".to_string(), Value::String(self.sub));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("exp".to_string(), json!(self.exp));
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        claims.insert("scope".to_string(), Value::String(self.scope));

        claims.extend(self.extra);
        for name in &self.omitted {
            claims.remove(name);
        }

        Value::Object(claims)
    }

    /// Sign with the key's own algorithm
    pub fn sign(self, key: &dyn TestSigningKey) -> String {
        let algorithm = key.algorithm();
        self.sign_with_algorithm(key, algorithm)
    }

    /// Sign with an explicit header algorithm
    pub fn sign_with_algorithm(self, key: &dyn TestSigningKey, algorithm: Algorithm) -> String {
        let mut header = Header::new(algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(key.kid().to_string());

        encode(&header, &self.build(), key.encoding_key()).expect("Failed to sign token")
    }
}
