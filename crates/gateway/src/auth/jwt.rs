//! Token verification.
//!
//! Validates incoming JWTs against the identity provider's published keys.
//!
//! # Order of checks
//!
//! 1. Size and structure of the token, then its unverified header
//! 2. Declared `alg` against the allow-list, before any key lookup or
//!    signature work (prevents algorithm substitution such as `none`)
//! 3. Key resolution by `kid` (one refresh on a miss)
//! 4. Signature over the signing input with the resolved key
//! 5. `iss`, `aud`, `exp`, `nbf` (with leeway) and `sub`
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The specific failure reason is logged at debug level and carried in
//!   [`VerificationError`]; the HTTP layer collapses all of them to one
//!   generic 401

use crate::auth::claims::VerifiedClaims;
use crate::auth::jwks::{KeyFetchError, KeyLookupError, KeyResolver};
use chrono::{DateTime, Utc};
use common::jwt::{decode_unverified_header, validate_exp_at, validate_nbf_at};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Verifier settings, loaded once at process start.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Required `iss` value, compared exactly.
    pub issuer_url: String,

    /// Value that `aud` must contain.
    pub audience: String,

    /// JWKS endpoint.
    pub jwks_url: String,

    /// Accepted JWS `alg` values.
    pub allowed_algorithms: BTreeSet<String>,

    /// Grace applied to `exp` and `nbf`.
    pub clock_skew: Duration,
}

/// Reason a token was rejected.
///
/// Internal diagnostics only. Never returned to the HTTP caller.
#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Algorithm '{0}' is not allowed")]
    DisallowedAlgorithm(String),

    #[error("Unknown signing key '{0}'")]
    UnknownKey(String),

    #[error("Signing keys unavailable: {0}")]
    KeyFetch(#[from] KeyFetchError),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid '{claim}' claim: {reason}")]
    ClaimValidation {
        claim: &'static str,
        reason: String,
    },
}

impl From<KeyLookupError> for VerificationError {
    fn from(err: KeyLookupError) -> Self {
        match err {
            KeyLookupError::UnknownKey(kid) => VerificationError::UnknownKey(kid),
            KeyLookupError::Fetch(e) => VerificationError::KeyFetch(e),
        }
    }
}

/// JWT verifier backed by a shared [`KeyResolver`].
pub struct TokenVerifier {
    resolver: Arc<KeyResolver>,
    config: AuthConfig,
}

impl TokenVerifier {
    /// Create a new verifier.
    pub fn new(resolver: Arc<KeyResolver>, config: AuthConfig) -> Self {
        Self { resolver, config }
    }

    /// Verifier settings.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerificationError`] for the first failed check.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Verify a token against an explicit `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerificationError`] for the first failed check.
    #[instrument(skip_all)]
    pub async fn verify_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<VerifiedClaims, VerificationError> {
        let result = self.verify_inner(token, now).await;
        match &result {
            Ok(_) => tracing::debug!(target: "gateway.auth.jwt", "Token validated successfully"),
            Err(e) => tracing::debug!(target: "gateway.auth.jwt", error = %e, "Token rejected"),
        }
        result
    }

    async fn verify_inner(
        &self,
        token: &str,
        now: i64,
    ) -> Result<VerifiedClaims, VerificationError> {
        // 1. Header (includes size check via common::jwt)
        let header = decode_unverified_header(token)
            .map_err(|e| VerificationError::MalformedToken(format!("{e:?}")))?;

        // 2. Algorithm allow-list, before anything touches key material
        if !self.config.allowed_algorithms.contains(&header.alg) {
            return Err(VerificationError::DisallowedAlgorithm(header.alg));
        }
        let algorithm = Algorithm::from_str(&header.alg)
            .map_err(|_| VerificationError::DisallowedAlgorithm(header.alg.clone()))?;

        // 3. Key resolution
        let key = self.resolver.get_key(&header.kid).await?;

        if let Some(key_alg) = key.algorithm() {
            if key_alg != header.alg {
                return Err(VerificationError::InvalidSignature(format!(
                    "key '{}' is declared for {key_alg}, token uses {}",
                    key.kid(),
                    header.alg
                )));
            }
        }

        // 4. Signature only; registered claims are checked below with our own leeway rules
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let token_data = decode::<Map<String, Value>>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => VerificationError::MalformedToken(e.to_string()),
                _ => VerificationError::InvalidSignature(e.to_string()),
            })?;

        // 5. Registered claims
        validate_claims_at(token_data.claims, &self.config, now)
    }
}

/// Validate the registered claims of a signature-checked payload.
///
/// Consumes the payload: recognised claims are moved into typed fields and
/// whatever remains becomes [`VerifiedClaims::raw`].
///
/// # Errors
///
/// Returns `VerificationError::ClaimValidation` naming the first claim that
/// is missing, mistyped or out of bounds.
pub fn validate_claims_at(
    mut payload: Map<String, Value>,
    config: &AuthConfig,
    now: i64,
) -> Result<VerifiedClaims, VerificationError> {
    let issuer = take_string(&mut payload, "iss")?.ok_or_else(|| claim_error("iss", "missing"))?;
    if issuer != config.issuer_url {
        return Err(claim_error("iss", "does not match the configured issuer"));
    }

    let audience = take_audience(&mut payload)?.ok_or_else(|| claim_error("aud", "missing"))?;
    if !audience.contains(&config.audience) {
        return Err(claim_error(
            "aud",
            "does not contain the configured audience",
        ));
    }

    let exp = take_numeric_date(&mut payload, "exp")?.ok_or_else(|| claim_error("exp", "missing"))?;
    validate_exp_at(exp, config.clock_skew, now).map_err(|_| claim_error("exp", "token expired"))?;

    let nbf = take_numeric_date(&mut payload, "nbf")?;
    if let Some(nbf) = nbf {
        validate_nbf_at(nbf, config.clock_skew, now)
            .map_err(|_| claim_error("nbf", "token not yet valid"))?;
    }

    let subject = take_string(&mut payload, "sub")?
        .filter(|sub| !sub.is_empty())
        .ok_or_else(|| claim_error("sub", "missing"))?;

    let scope = take_string(&mut payload, "scope")?
        .map(|scope| scope.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    Ok(VerifiedClaims::new(
        subject,
        issuer,
        audience,
        to_datetime(exp, "exp")?,
        nbf.map(|nbf| to_datetime(nbf, "nbf")).transpose()?,
        scope,
        payload,
    ))
}

fn claim_error(claim: &'static str, reason: &str) -> VerificationError {
    VerificationError::ClaimValidation {
        claim,
        reason: reason.to_string(),
    }
}

fn take_string(
    payload: &mut Map<String, Value>,
    claim: &'static str,
) -> Result<Option<String>, VerificationError> {
    match payload.remove(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(claim_error(claim, "must be a string")),
    }
}

fn take_numeric_date(
    payload: &mut Map<String, Value>,
    claim: &'static str,
) -> Result<Option<i64>, VerificationError> {
    match payload.remove(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.floor() as i64))
            .map(Some)
            .ok_or_else(|| claim_error(claim, "must be a numeric date")),
        Some(_) => Err(claim_error(claim, "must be a numeric date")),
    }
}

/// `aud` may be a single string or an array of strings.
fn take_audience(
    payload: &mut Map<String, Value>,
) -> Result<Option<BTreeSet<String>>, VerificationError> {
    match payload.remove("aud") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(BTreeSet::from([s]))),
        Some(Value::Array(values)) => values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(claim_error("aud", "must contain only strings")),
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Some),
        Some(_) => Err(claim_error("aud", "must be a string or an array of strings")),
    }
}

fn to_datetime(secs: i64, claim: &'static str) -> Result<DateTime<Utc>, VerificationError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| claim_error(claim, "out of range"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use common::jwt::MAX_JWT_SIZE_BYTES;
    use gateway_test_utils::crypto_fixtures::{
        jwks_json, unsigned_token, EcP384TestKey, Ed25519TestKey, RsaTestKey, TestSigningKey,
    };
    use gateway_test_utils::token_builders::TestTokenBuilder;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ISSUER: &str = "https://tenant.example.com/oidc";
    const AUDIENCE: &str = "https://api.example.com";
    const NOW: i64 = 1_800_000_000;

    struct Fixture {
        server: MockServer,
        verifier: TokenVerifier,
    }

    impl Fixture {
        async fn new(keys: &[&dyn TestSigningKey], allowed: &[&str]) -> Self {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/jwks"))
                .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
                .mount(&server)
                .await;

            let jwks_url = format!("{}/jwks", server.uri());
            let resolver = Arc::new(KeyResolver::initialize(jwks_url.clone()).await.unwrap());
            let config = AuthConfig {
                issuer_url: ISSUER.to_string(),
                audience: AUDIENCE.to_string(),
                jwks_url,
                allowed_algorithms: allowed.iter().map(ToString::to_string).collect(),
                clock_skew: Duration::from_secs(60),
            };

            Self {
                server,
                verifier: TokenVerifier::new(resolver, config),
            }
        }

        async fn fetch_count(&self) -> usize {
            self.server.received_requests().await.unwrap().len()
        }
    }

    fn claims() -> TestTokenBuilder {
        TestTokenBuilder::new(ISSUER, AUDIENCE)
            .for_user("user-42")
            .issued_at(NOW)
            .expires_at(NOW + 3600)
    }

    fn assert_claim_error(result: Result<VerifiedClaims, VerificationError>, expected: &str) {
        match result {
            Err(VerificationError::ClaimValidation { claim, .. }) => assert_eq!(claim, expected),
            other => panic!("Expected ClaimValidation({expected}), got {other:?}"),
        }
    }

    // =========================================================================
    // Happy paths
    // =========================================================================

    #[tokio::test]
    async fn test_valid_rs256_token() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256", "ES384"]).await;

        let token = claims()
            .with_scope("read:data write:data")
            .with_claim("client_id", json!("app-1"))
            .not_before(NOW - 10)
            .sign(&key);

        let verified = fixture.verifier.verify_at(&token, NOW).await.unwrap();

        assert_eq!(verified.subject(), "user-42");
        assert_eq!(verified.issuer(), ISSUER);
        assert!(verified.audience().contains(AUDIENCE));
        assert_eq!(verified.expires_at().timestamp(), NOW + 3600);
        assert_eq!(verified.not_before().map(|t| t.timestamp()), Some(NOW - 10));
        assert_eq!(verified.scopes(), ["read:data", "write:data"]);
        assert_eq!(verified.raw().get("client_id"), Some(&json!("app-1")));
        assert!(verified.raw().get("iss").is_none());
    }

    #[tokio::test]
    async fn test_valid_es384_token() {
        let key = EcP384TestKey::generate("ec-1");
        let fixture = Fixture::new(&[&key], &["RS256", "ES384"]).await;

        let token = claims().with_scope("read:data").sign(&key);

        let verified = fixture.verifier.verify_at(&token, NOW).await.unwrap();
        assert!(verified.has_scope("read:data"));
    }

    #[tokio::test]
    async fn test_valid_eddsa_token_when_allowed() {
        let key = Ed25519TestKey::from_seed(7, "ed-1");
        let fixture = Fixture::new(&[&key], &["EdDSA"]).await;

        let token = claims().sign(&key);

        assert!(fixture.verifier.verify_at(&token, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_audience_array_containing_configured_value() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let token = claims()
            .audiences(&["https://other.example.com", AUDIENCE])
            .sign(&key);

        let verified = fixture.verifier.verify_at(&token, NOW).await.unwrap();
        assert_eq!(verified.audience().len(), 2);
    }

    #[tokio::test]
    async fn test_scope_whitespace_and_absence() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let padded = claims().with_scope("  read:data \t write:data  ").sign(&key);
        let verified = fixture.verifier.verify_at(&padded, NOW).await.unwrap();
        assert_eq!(verified.scopes(), ["read:data", "write:data"]);

        let absent = claims().without_claim("scope").sign(&key);
        let verified = fixture.verifier.verify_at(&absent, NOW).await.unwrap();
        assert!(verified.scopes().is_empty());
    }

    // =========================================================================
    // Algorithm and key checks
    // =========================================================================

    #[tokio::test]
    async fn test_alg_none_rejected_before_key_lookup() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256", "ES384"]).await;

        // Unknown kid: a key lookup would show up as a second JWKS fetch
        let token = unsigned_token("never-published", &claims().build());

        let result = fixture.verifier.verify_at(&token, NOW).await;

        assert!(matches!(result, Err(VerificationError::DisallowedAlgorithm(alg)) if alg == "none"));
        assert_eq!(fixture.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_algorithm_outside_allow_list_rejected() {
        let key = Ed25519TestKey::from_seed(3, "ed-1");
        let fixture = Fixture::new(&[&key], &["RS256", "ES384"]).await;

        let token = claims().sign(&key);

        assert!(matches!(
            fixture.verifier.verify_at(&token, NOW).await,
            Err(VerificationError::DisallowedAlgorithm(alg)) if alg == "EdDSA"
        ));
        assert_eq!(fixture.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_once_then_fails() {
        let published = RsaTestKey::new("rsa-1");
        let unpublished = EcP384TestKey::generate("ec-unpublished");
        let fixture = Fixture::new(&[&published], &["RS256", "ES384"]).await;

        let token = claims().sign(&unpublished);

        assert!(matches!(
            fixture.verifier.verify_at(&token, NOW).await,
            Err(VerificationError::UnknownKey(kid)) if kid == "ec-unpublished"
        ));
        assert_eq!(fixture.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_tampered_payload_fails_signature() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let token = claims().with_scope("read:data").sign(&key);
        let forged_payload = claims().with_scope("admin").build();
        let mut parts = token.split('.');
        let (header, _, signature) = (
            parts.next().unwrap(),
            parts.next().unwrap(),
            parts.next().unwrap(),
        );
        let forged = format!(
            "{header}.{}.{signature}",
            gateway_test_utils::crypto_fixtures::b64url(forged_payload.to_string().as_bytes())
        );

        assert!(matches!(
            fixture.verifier.verify_at(&forged, NOW).await,
            Err(VerificationError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_signature_from_other_key_with_same_kid() {
        let published = EcP384TestKey::generate("ec-1");
        let impostor = EcP384TestKey::generate("ec-1");
        let fixture = Fixture::new(&[&published], &["ES384"]).await;

        let token = claims().sign(&impostor);

        assert!(matches!(
            fixture.verifier.verify_at(&token, NOW).await,
            Err(VerificationError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_key_declared_for_other_algorithm() {
        // Published JWK says RS256, token header says RS384 with the same key
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256", "RS384"]).await;

        let token = claims().sign_with_algorithm(&key, Algorithm::RS384);

        assert!(matches!(
            fixture.verifier.verify_at(&token, NOW).await,
            Err(VerificationError::InvalidSignature(msg)) if msg.contains("RS384")
        ));
    }

    #[tokio::test]
    async fn test_malformed_tokens() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.payload.sig"] {
            assert!(
                matches!(
                    fixture.verifier.verify_at(token, NOW).await,
                    Err(VerificationError::MalformedToken(_))
                ),
                "token {token:?} should be malformed"
            );
        }

        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(matches!(
            fixture.verifier.verify_at(&oversized, NOW).await,
            Err(VerificationError::MalformedToken(_))
        ));
    }

    // =========================================================================
    // Registered claims
    // =========================================================================

    #[tokio::test]
    async fn test_wrong_issuer() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let token = claims().issuer("https://evil.example.com/oidc").sign(&key);
        assert_claim_error(fixture.verifier.verify_at(&token, NOW).await, "iss");

        // Exact comparison: a trailing slash is a different issuer
        let token = claims().issuer(&format!("{ISSUER}/")).sign(&key);
        assert_claim_error(fixture.verifier.verify_at(&token, NOW).await, "iss");
    }

    #[tokio::test]
    async fn test_wrong_audience() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let token = claims().audiences(&["https://other.example.com"]).sign(&key);
        assert_claim_error(fixture.verifier.verify_at(&token, NOW).await, "aud");
    }

    #[tokio::test]
    async fn test_expiry_leeway_boundary() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let at_leeway = claims().expires_at(NOW - 60).sign(&key);
        assert!(fixture.verifier.verify_at(&at_leeway, NOW).await.is_ok());

        let inside_leeway = claims().expires_at(NOW - 30).sign(&key);
        assert!(fixture.verifier.verify_at(&inside_leeway, NOW).await.is_ok());

        let past_leeway = claims().expires_at(NOW - 61).sign(&key);
        assert_claim_error(fixture.verifier.verify_at(&past_leeway, NOW).await, "exp");
    }

    #[tokio::test]
    async fn test_not_before_leeway_boundary() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        let at_leeway = claims().not_before(NOW + 60).sign(&key);
        assert!(fixture.verifier.verify_at(&at_leeway, NOW).await.is_ok());

        let past_leeway = claims().not_before(NOW + 61).sign(&key);
        assert_claim_error(fixture.verifier.verify_at(&past_leeway, NOW).await, "nbf");
    }

    #[tokio::test]
    async fn test_missing_required_claims() {
        let key = RsaTestKey::new("rsa-1");
        let fixture = Fixture::new(&[&key], &["RS256"]).await;

        for claim in ["iss", "aud", "exp", "sub"] {
            let token = claims().without_claim(claim).sign(&key);
            assert_claim_error(fixture.verifier.verify_at(&token, NOW).await, claim);
        }
    }

    // =========================================================================
    // validate_claims_at (no signature involved)
    // =========================================================================

    fn config() -> AuthConfig {
        AuthConfig {
            issuer_url: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            jwks_url: "http://unused/jwks".to_string(),
            allowed_algorithms: BTreeSet::from(["RS256".to_string()]),
            clock_skew: Duration::from_secs(60),
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_claims_with_wrong_types() {
        let base = json!({"iss": ISSUER, "aud": AUDIENCE, "sub": "u", "exp": NOW + 10});

        let mut bad_iss = base.clone();
        bad_iss["iss"] = json!(42);
        assert_claim_error(validate_claims_at(payload(bad_iss), &config(), NOW), "iss");

        let mut bad_aud = base.clone();
        bad_aud["aud"] = json!([AUDIENCE, 7]);
        assert_claim_error(validate_claims_at(payload(bad_aud), &config(), NOW), "aud");

        let mut bad_exp = base.clone();
        bad_exp["exp"] = json!("tomorrow");
        assert_claim_error(validate_claims_at(payload(bad_exp), &config(), NOW), "exp");

        let mut bad_scope = base;
        bad_scope["scope"] = json!(["read:data"]);
        assert_claim_error(validate_claims_at(payload(bad_scope), &config(), NOW), "scope");
    }

    #[test]
    fn test_fractional_exp_is_accepted() {
        let claims = payload(json!({"iss": ISSUER, "aud": AUDIENCE, "sub": "u", "exp": 1_800_000_100.5}));

        let verified = validate_claims_at(claims, &config(), NOW).unwrap();
        assert_eq!(verified.expires_at().timestamp(), 1_800_000_100);
    }

    #[test]
    fn test_zero_leeway_is_strict() {
        let mut strict = config();
        strict.clock_skew = Duration::ZERO;

        let claims = payload(json!({"iss": ISSUER, "aud": AUDIENCE, "sub": "u", "exp": NOW - 1}));
        assert_claim_error(validate_claims_at(claims, &strict, NOW), "exp");

        let claims = payload(json!({"iss": ISSUER, "aud": AUDIENCE, "sub": "u", "exp": NOW}));
        assert!(validate_claims_at(claims, &strict, NOW).is_ok());
    }
}
