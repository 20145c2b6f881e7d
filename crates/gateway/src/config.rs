//! Gateway configuration.
//!
//! Configuration is loaded from environment variables (after `.env`, which
//! the binary loads first). A missing required setting is returned as a
//! [`ConfigError`]; the process entry point decides to exit.

use crate::auth::AuthConfig;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind host.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default accepted signing algorithms.
pub const DEFAULT_ALLOWED_ALGORITHMS: &str = "RS256,ES384";

/// Default background JWKS refresh interval in seconds (1 hour).
pub const DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 3600;

/// Asymmetric JWS algorithms the verifier can be configured to accept.
///
/// HMAC and `none` are deliberately absent.
pub const SUPPORTED_ALGORITHMS: &[&str] = &[
    "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA",
];

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Expected token issuer (`ISSUER_URL`).
    pub issuer_url: String,

    /// Expected token audience (`AUDIENCE`).
    pub audience: String,

    /// JWKS endpoint (`JWKS_URL`, default `<ISSUER_URL>/jwks`).
    pub jwks_url: String,

    /// Server bind address, `<BIND_HOST>:<PORT>`.
    pub bind_address: String,

    /// Accepted JWS algorithms (`ALLOWED_ALGORITHMS`).
    pub allowed_algorithms: BTreeSet<String>,

    /// JWT clock skew tolerance in seconds for exp/nbf validation.
    pub jwt_clock_skew_seconds: u64,

    /// Background JWKS refresh interval; `None` when disabled.
    pub jwks_refresh_interval: Option<Duration>,

    /// Graceful shutdown drain period in seconds.
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port configuration: {0}")]
    InvalidPort(String),

    #[error("Invalid allowed algorithms configuration: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS refresh interval configuration: {0}")]
    InvalidRefreshInterval(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer_url = required(vars, "ISSUER_URL")?;
        let audience = required(vars, "AUDIENCE")?;

        let jwks_url = vars
            .get("JWKS_URL")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| default_jwks_url(&issuer_url));

        let port = if let Some(value_str) = vars.get("PORT") {
            value_str.parse::<u16>().map_err(|e| {
                ConfigError::InvalidPort(format!(
                    "PORT must be a valid port number, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_PORT
        };

        let bind_host = vars
            .get("BIND_HOST")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let allowed_algorithms = parse_algorithms(
            vars.get("ALLOWED_ALGORITHMS")
                .map_or(DEFAULT_ALLOWED_ALGORITHMS, String::as_str),
        )?;

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let refresh_seconds = if let Some(value_str) = vars.get("JWKS_REFRESH_INTERVAL_SECONDS") {
            value_str.parse::<u64>().map_err(|e| {
                ConfigError::InvalidRefreshInterval(format!(
                    "JWKS_REFRESH_INTERVAL_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS
        };
        let jwks_refresh_interval = (refresh_seconds > 0).then(|| Duration::from_secs(refresh_seconds));

        let drain_seconds = if let Some(value_str) = vars.get("GATEWAY_DRAIN_SECONDS") {
            value_str.parse::<u64>().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "GATEWAY_DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            0
        };

        Ok(Config {
            issuer_url,
            audience,
            jwks_url,
            bind_address: format!("{bind_host}:{port}"),
            allowed_algorithms,
            jwt_clock_skew_seconds,
            jwks_refresh_interval,
            drain_seconds,
        })
    }

    /// Settings consumed by the token verifier.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            issuer_url: self.issuer_url.clone(),
            audience: self.audience.clone(),
            jwks_url: self.jwks_url.clone(),
            allowed_algorithms: self.allowed_algorithms.clone(),
            clock_skew: Duration::from_secs(self.jwt_clock_skew_seconds),
        }
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// `<issuer>/jwks`, without doubling a trailing slash on the issuer.
fn default_jwks_url(issuer_url: &str) -> String {
    if issuer_url.ends_with('/') {
        format!("{issuer_url}jwks")
    } else {
        format!("{issuer_url}/jwks")
    }
}

fn parse_algorithms(value: &str) -> Result<BTreeSet<String>, ConfigError> {
    let mut algorithms = BTreeSet::new();

    for alg in value.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        if !SUPPORTED_ALGORITHMS.contains(&alg) {
            return Err(ConfigError::InvalidAlgorithms(format!(
                "'{}' is not an accepted asymmetric algorithm (supported: {})",
                alg,
                SUPPORTED_ALGORITHMS.join(", ")
            )));
        }
        algorithms.insert(alg.to_string());
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithms(
            "ALLOWED_ALGORITHMS must list at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}
