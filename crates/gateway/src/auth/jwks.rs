//! JWKS key resolver.
//!
//! Fetches the identity provider's published signing keys and keeps the
//! current [`SigningKeySet`] as shared state for every concurrent verification.
//!
//! # Consistency
//!
//! - Readers clone an `Arc` snapshot of the whole set; they never see a
//!   partially built one
//! - A refresh builds a complete new set off to the side and swaps it in
//! - A fetch that fails, or yields no usable keys, leaves the previous set
//!   in place, so once one fetch has succeeded the set is never empty
//! - Refreshes triggered by simultaneous lookup misses are coalesced: callers
//!   queue on a single refresh gate and skip the fetch if another caller
//!   already replaced the set while they waited
//!
//! # Security
//!
//! - Only asymmetric keys are accepted (`RSA`, `EC` P-256/P-384, `OKP` Ed25519)
//! - Keys marked for a use other than `sig` are ignored
//! - HTTPS should be used in production (enforced by deployment config)

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default timeout for a single JWKS fetch.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Wire format
// =============================================================================

/// JSON Web Key as published on the JWKS endpoint.
///
/// Every field is optional on the wire; [`SigningKey::from_jwk`] decides
/// which combinations are usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`, `OKP`, ...).
    #[serde(default)]
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Declared algorithm (e.g. `RS256`).
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for `EC` and `OKP` keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// `EC` x coordinate or `OKP` public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// `EC` y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

// =============================================================================
// Errors
// =============================================================================

/// Failure to obtain a usable key set from the JWKS endpoint.
///
/// Recoverable: the previous key set stays in service.
#[derive(Debug, Clone, Error)]
pub enum KeyFetchError {
    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("JWKS document is malformed: {0}")]
    Malformed(String),

    #[error("JWKS document contains no usable signing keys")]
    NoUsableKeys,

    #[error("Failed to build JWKS HTTP client: {0}")]
    Client(String),
}

/// Failure to resolve a key identifier.
#[derive(Debug, Clone, Error)]
pub enum KeyLookupError {
    /// The identifier is absent even after one refresh.
    #[error("No signing key with id '{0}'")]
    UnknownKey(String),

    /// The miss-triggered refresh failed.
    #[error(transparent)]
    Fetch(#[from] KeyFetchError),
}

// =============================================================================
// Key set
// =============================================================================

/// A public verification key ready for use.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    kty: String,
    alg: Option<String>,
    key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a verification key from a JWK.
    ///
    /// # Errors
    ///
    /// Returns the reason the JWK is unusable: missing `kid`, non-signing
    /// use, unsupported key type or curve, or missing/invalid key material.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "missing kid".to_string())?;

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(format!("key use '{key_use}' is not 'sig'"));
            }
        }

        let key = match jwk.kty.as_str() {
            "RSA" => {
                let n = component(jwk.n.as_deref(), "n")?;
                let e = component(jwk.e.as_deref(), "e")?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| format!("invalid RSA components: {err}"))?
            }
            "EC" => {
                match jwk.crv.as_deref() {
                    Some("P-256" | "P-384") => {}
                    other => return Err(format!("unsupported EC curve {other:?}")),
                }
                let x = component(jwk.x.as_deref(), "x")?;
                let y = component(jwk.y.as_deref(), "y")?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|err| format!("invalid EC components: {err}"))?
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(format!("unsupported OKP curve {:?}", jwk.crv));
                }
                let x = component(jwk.x.as_deref(), "x")?;
                DecodingKey::from_ed_components(x)
                    .map_err(|err| format!("invalid Ed25519 key: {err}"))?
            }
            other => return Err(format!("unsupported key type '{other}'")),
        };

        Ok(Self {
            kid: kid.to_string(),
            kty: jwk.kty.clone(),
            alg: jwk.alg.clone().filter(|alg| !alg.is_empty()),
            key,
        })
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Key type as published (`RSA`, `EC`, `OKP`).
    pub fn key_type(&self) -> &str {
        &self.kty
    }

    /// Algorithm the key is declared for, if the JWK names one.
    pub fn algorithm(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// Key material for signature verification.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

fn component<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing '{name}'"))
}

/// Immutable mapping from key identifier to verification key.
///
/// Replaced as a whole on every successful fetch, never merged.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, SigningKey>,
}

impl SigningKeySet {
    /// Build a key set from a JWKS document, skipping unusable keys.
    ///
    /// When two JWKs share a `kid` the later one wins.
    pub fn from_document(document: JwksDocument) -> Self {
        let mut keys = HashMap::with_capacity(document.keys.len());

        for jwk in &document.keys {
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(key.kid()) {
                        tracing::warn!(
                            target: "gateway.auth.jwks",
                            kid = %key.kid(),
                            "Duplicate kid in JWKS, keeping the later key"
                        );
                    }
                    keys.insert(key.kid.clone(), key);
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "gateway.auth.jwks",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        reason = %reason,
                        "Skipping unusable JWK"
                    );
                }
            }
        }

        Self { keys }
    }

    /// Look up a key by identifier.
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Identifiers of all keys in the set (unordered).
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Thread-safe JWKS cache with miss-triggered refresh.
///
/// Shared as `Arc<KeyResolver>` between the token verifier and the
/// background refresh task.
pub struct KeyResolver {
    /// URL of the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Current key set snapshot.
    current: RwLock<Arc<SigningKeySet>>,

    /// Serializes fetches and holds the failure of the latest attempt, if any.
    refresh_gate: Mutex<Option<KeyFetchError>>,

    /// Incremented after every successful swap.
    generation: AtomicU64,

    /// Incremented after every completed fetch, successful or not.
    attempts: AtomicU64,
}

impl KeyResolver {
    /// Create a resolver with an empty key set. No network I/O.
    ///
    /// Use [`KeyResolver::initialize`] at process start instead; this
    /// constructor exists for callers that manage the first fetch themselves.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError::Client` if the HTTP client cannot be built.
    pub fn new(jwks_url: String) -> Result<Self, KeyFetchError> {
        Self::with_timeout(jwks_url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a resolver with a custom per-fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError::Client` if the HTTP client cannot be built.
    pub fn with_timeout(jwks_url: String, timeout: Duration) -> Result<Self, KeyFetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to build JWKS HTTP client");
                KeyFetchError::Client(e.to_string())
            })?;

        Ok(Self {
            jwks_url,
            http_client,
            current: RwLock::new(Arc::new(SigningKeySet::default())),
            refresh_gate: Mutex::new(None),
            generation: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
        })
    }

    /// Create a resolver and perform the initial fetch.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError` if the first key set cannot be obtained. The
    /// gateway cannot authenticate anything without it, so callers treat
    /// this as fatal.
    #[instrument(skip_all, fields(jwks_url = %jwks_url))]
    pub async fn initialize(jwks_url: String) -> Result<Self, KeyFetchError> {
        let resolver = Self::new(jwks_url)?;
        resolver.refresh().await?;
        Ok(resolver)
    }

    /// URL of the JWKS endpoint.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Consistent snapshot of the current key set.
    pub async fn snapshot(&self) -> Arc<SigningKeySet> {
        Arc::clone(&*self.current.read().await)
    }

    /// Number of successful fetches so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Resolve a key by identifier.
    ///
    /// On a miss, performs at most one refresh and retries the lookup once.
    /// Callers that missed while another fetch was in flight share that
    /// fetch's outcome, including its failure.
    ///
    /// # Errors
    ///
    /// - `KeyLookupError::Fetch` - the refresh failed
    /// - `KeyLookupError::UnknownKey` - still absent after the refresh
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<SigningKey, KeyLookupError> {
        let observed = self.attempts.load(Ordering::Acquire);

        if let Some(key) = self.snapshot().await.get(kid) {
            tracing::debug!(target: "gateway.auth.jwks", kid = %kid, "JWKS cache hit");
            return Ok(key.clone());
        }

        tracing::debug!(target: "gateway.auth.jwks", kid = %kid, "Key not found in JWKS cache, refreshing");
        self.refresh_after_miss(observed).await?;

        if let Some(key) = self.snapshot().await.get(kid) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "gateway.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        Err(KeyLookupError::UnknownKey(kid.to_string()))
    }

    /// Fetch the key set and swap it in.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError` on transport failure, non-success status,
    /// unparseable document or a document without usable keys. The previous
    /// key set is retained.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        let mut last_failure = self.refresh_gate.lock().await;
        self.attempt(&mut last_failure).await
    }

    async fn refresh_after_miss(&self, observed: u64) -> Result<(), KeyFetchError> {
        let mut last_failure = self.refresh_gate.lock().await;

        if self.attempts.load(Ordering::Acquire) != observed {
            tracing::debug!(
                target: "gateway.auth.jwks",
                failed = last_failure.is_some(),
                "JWKS fetch completed while waiting, reusing its outcome"
            );
            return match last_failure.as_ref() {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
        }

        self.attempt(&mut last_failure).await.map(|_| ())
    }

    /// Must be called with the refresh gate held.
    async fn attempt(
        &self,
        last_failure: &mut Option<KeyFetchError>,
    ) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        let result = self.fetch_and_swap().await;
        *last_failure = result.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn fetch_and_swap(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        let set = Arc::new(self.fetch().await?);

        *self.current.write().await = Arc::clone(&set);
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::info!(
            target: "gateway.auth.jwks",
            key_count = set.len(),
            "JWKS cache refreshed"
        );

        Ok(set)
    }

    async fn fetch(&self) -> Result<SigningKeySet, KeyFetchError> {
        tracing::debug!(target: "gateway.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to fetch JWKS");
                KeyFetchError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gateway.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeyFetchError::Status(response.status().as_u16()));
        }

        let document: JwksDocument = response.json().await.map_err(|e| {
            tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyFetchError::Malformed(e.to_string())
        })?;

        let set = SigningKeySet::from_document(document);
        if set.is_empty() {
            tracing::error!(target: "gateway.auth.jwks", "JWKS contains no usable keys");
            return Err(KeyFetchError::NoUsableKeys);
        }

        Ok(set)
    }
}
