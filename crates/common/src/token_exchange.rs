//! OAuth 2.0 Token Exchange client (RFC 8693).
//!
//! Trades a long-lived personal access token (PAT) for a short-lived access
//! token at the identity provider's `/oidc/token` endpoint.
//!
//! # Behaviour
//!
//! - Exactly one HTTP round trip per [`ExchangeClient::exchange`] call
//! - No retry and no caching of the issued token
//! - A non-2xx status is terminal and carries the raw response body, so the
//!   operator can see the provider's rejection reason verbatim
//! - A 2xx body that does not parse is a distinct terminal error
//!
//! # Example
//!
//! ```rust,ignore
//! use common::secret::SecretString;
//! use common::token_exchange::{ExchangeClient, ExchangeRequest};
//!
//! let request = ExchangeRequest::new(
//!     "https://tenant.logto.app/".to_string(),
//!     "my-client".to_string(),
//!     SecretString::from(pat),
//! )
//! .with_scope(Some("read:data".to_string()));
//!
//! let response = ExchangeClient::new()?.exchange(&request).await?;
//! ```
//!
//! # Security
//!
//! - The PAT, client secret and issued access token are `SecretString`
//! - Request/response `Debug` output redacts all three
//! - Only the endpoint URL and status code are logged

use crate::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

// =============================================================================
// Constants
// =============================================================================

/// `grant_type` value for RFC 8693 token exchange.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// `subject_token_type` value identifying a Logto personal access token.
pub const PERSONAL_ACCESS_TOKEN_TYPE: &str = "urn:logto:token-type:personal_access_token";

/// Path of the token endpoint relative to the tenant URL.
pub const TOKEN_ENDPOINT_PATH: &str = "/oidc/token";

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a token exchange.
///
/// These are operator-facing: `Status` and `InvalidResponse` keep the raw
/// response body for diagnosis.
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    /// Client could not be constructed or the request is incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure (DNS, connect, TLS, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The token endpoint answered with a non-success status.
    #[error("Token exchange failed with status code {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body, verbatim.
        body: String,
    },

    /// The token endpoint answered 2xx but the body is not a token response.
    #[error("Invalid token response: {reason}; raw response: {body}")]
    InvalidResponse {
        /// Parser error.
        reason: String,
        /// Raw response body, verbatim.
        body: String,
    },
}

// =============================================================================
// Request
// =============================================================================

/// How the client authenticates itself to the token endpoint.
///
/// Whether the provider requires a client secret for this grant depends on
/// the application type registered with it, so this is configuration rather
/// than a fixed choice.
#[derive(Clone, Default)]
pub enum ClientAuthentication {
    /// Public client: only `client_id` in the form body.
    #[default]
    None,

    /// `client_id` in the body plus HTTP Basic `client_id:client_secret`.
    Basic(SecretString),

    /// `client_id` and `client_secret` both in the form body.
    Post(SecretString),
}

impl std::fmt::Debug for ClientAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic(_) => f.write_str("Basic([REDACTED])"),
            Self::Post(_) => f.write_str("Post([REDACTED])"),
        }
    }
}

/// A single token-exchange request. Built fresh per invocation, never persisted.
#[derive(Clone)]
pub struct ExchangeRequest {
    /// Tenant base URL (e.g. `https://tenant.logto.app`). A trailing slash is ignored.
    pub tenant_url: String,

    /// OAuth client ID.
    pub client_id: String,

    /// The personal access token being exchanged.
    pub subject_token: SecretString,

    /// Requested scopes, space separated.
    pub scope: Option<String>,

    /// Target API resource indicator.
    pub resource: Option<String>,

    /// Client authentication mode.
    pub client_auth: ClientAuthentication,
}

impl std::fmt::Debug for ExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRequest")
            .field("tenant_url", &self.tenant_url)
            .field("client_id", &self.client_id)
            .field("subject_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("resource", &self.resource)
            .field("client_auth", &self.client_auth)
            .finish()
    }
}

impl ExchangeRequest {
    /// Create a request with no scope, no resource and a public client.
    #[must_use]
    pub fn new(tenant_url: String, client_id: String, subject_token: SecretString) -> Self {
        Self {
            tenant_url,
            client_id,
            subject_token,
            scope: None,
            resource: None,
            client_auth: ClientAuthentication::None,
        }
    }

    /// Set the requested scope. Empty strings are treated as absent.
    #[must_use]
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope.filter(|s| !s.is_empty());
        self
    }

    /// Set the resource indicator. Empty strings are treated as absent.
    #[must_use]
    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.resource = resource.filter(|s| !s.is_empty());
        self
    }

    /// Set the client authentication mode.
    #[must_use]
    pub fn with_client_auth(mut self, client_auth: ClientAuthentication) -> Self {
        self.client_auth = client_auth;
        self
    }

    /// Token endpoint URL: tenant URL without trailing slashes, plus `/oidc/token`.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.tenant_url.trim_end_matches('/'),
            TOKEN_ENDPOINT_PATH
        )
    }

    /// The `application/x-www-form-urlencoded` fields, in send order.
    ///
    /// `scope` and `resource` are included only when non-empty.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("grant_type", TOKEN_EXCHANGE_GRANT_TYPE),
            ("subject_token", self.subject_token.expose_secret()),
            ("subject_token_type", PERSONAL_ACCESS_TOKEN_TYPE),
            ("client_id", self.client_id.as_str()),
        ];

        if let Some(scope) = self.scope.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("scope", scope));
        }
        if let Some(resource) = self.resource.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("resource", resource));
        }
        if let ClientAuthentication::Post(secret) = &self.client_auth {
            fields.push(("client_secret", secret.expose_secret()));
        }

        fields
    }

    fn validate(&self) -> Result<(), ExchangeError> {
        if self.tenant_url.trim_end_matches('/').is_empty() {
            return Err(ExchangeError::Configuration("tenant URL is empty".into()));
        }
        if self.client_id.is_empty() {
            return Err(ExchangeError::Configuration("client ID is empty".into()));
        }
        if self.subject_token.expose_secret().is_empty() {
            return Err(ExchangeError::Configuration(
                "personal access token is empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Response
// =============================================================================

/// Successful token-exchange response.
#[derive(Deserialize)]
pub struct ExchangeResponse {
    /// The issued access token.
    pub access_token: SecretString,

    /// Type of the issued token (e.g. `urn:ietf:params:oauth:token-type:access_token`).
    pub issued_token_type: String,

    /// Token type for the `Authorization` header (e.g. `Bearer`).
    pub token_type: String,

    /// Lifetime of the access token in seconds.
    pub expires_in: u64,

    /// Granted scopes, when the provider reports them.
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for ExchangeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeResponse")
            .field("access_token", &"[REDACTED]")
            .field("issued_token_type", &self.issued_token_type)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the token-exchange endpoint.
#[derive(Clone)]
pub struct ExchangeClient {
    http_client: reqwest::Client,
}

impl ExchangeClient {
    /// Build a client with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Configuration` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ExchangeError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Build a client with a custom overall request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::Configuration` if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ExchangeError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                ExchangeError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { http_client })
    }

    /// Exchange the request's personal access token for an access token.
    ///
    /// # Errors
    ///
    /// - `Configuration` - empty tenant URL, client ID or PAT
    /// - `Http` - transport failure
    /// - `Status` - non-success HTTP status (raw body attached)
    /// - `InvalidResponse` - 2xx body is not a token response (raw body attached)
    #[instrument(skip_all, fields(client_id = %request.client_id))]
    pub async fn exchange(
        &self,
        request: &ExchangeRequest,
    ) -> Result<ExchangeResponse, ExchangeError> {
        request.validate()?;

        let url = request.token_endpoint();
        debug!(target: "common.token_exchange", url = %url, "Requesting token exchange");

        let mut builder = self.http_client.post(&url).form(&request.form_fields());
        if let ClientAuthentication::Basic(secret) = &request.client_auth {
            builder = builder.basic_auth(&request.client_id, Some(secret.expose_secret()));
        }

        let response = builder.send().await.map_err(|e| {
            debug!(target: "common.token_exchange", error = %e, "HTTP request failed");
            ExchangeError::Http(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            debug!(target: "common.token_exchange", error = %e, "Failed to read response body");
            ExchangeError::Http(e.to_string())
        })?;

        if !status.is_success() {
            warn!(
                target: "common.token_exchange",
                status = %status,
                "Token endpoint rejected the exchange"
            );
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: ExchangeResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(target: "common.token_exchange", error = %e, "Failed to parse token response");
            ExchangeError::InvalidResponse {
                reason: e.to_string(),
                body: body.clone(),
            }
        })?;

        debug!(
            target: "common.token_exchange",
            expires_in_secs = token_response.expires_in,
            "Token exchange succeeded"
        );

        Ok(token_response)
    }
}

// =============================================================================
// Tests
// =============================================================================
