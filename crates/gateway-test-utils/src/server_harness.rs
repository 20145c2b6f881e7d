//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use crate::jwks_mock::MockJwksServer;
use gateway::auth::{Authenticator, KeyResolver, TokenVerifier};
use gateway::config::Config;
use gateway::routes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Audience every harness instance is configured with.
pub const TEST_AUDIENCE: &str = "https://api.example.com";

/// Test harness for spawning the gateway in E2E tests.
///
/// The issuer is the mock JWKS server's base URL, so tokens built with
/// `TestTokenBuilder::new(&jwks.issuer_url(), TEST_AUDIENCE)` are accepted.
/// Periodic key refresh is disabled; tests drive refreshes explicitly.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwksServer::start(&[&key]).await;
/// let server = TestGatewayServer::spawn(&jwks).await?;
///
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    resolver: Arc<KeyResolver>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway trusting `jwks`.
    pub async fn spawn(jwks: &MockJwksServer) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(jwks, HashMap::new()).await
    }

    /// Spawn with extra environment-style settings layered over the defaults.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Fetch the initial key set from `jwks`
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        jwks: &MockJwksServer,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("ISSUER_URL".to_string(), jwks.issuer_url()),
            ("AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("JWKS_URL".to_string(), jwks.jwks_url()),
            ("BIND_HOST".to_string(), "127.0.0.1".to_string()),
            ("PORT".to_string(), "0".to_string()),
            (
                "JWKS_REFRESH_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let resolver = Arc::new(
            KeyResolver::initialize(config.jwks_url.clone())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to load JWKS: {}", e))?,
        );
        let verifier = TokenVerifier::new(Arc::clone(&resolver), config.auth_config());

        // Build routes using the gateway's real route builder
        let app = routes::build_routes(Arc::new(Authenticator::new(verifier)));

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            resolver,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key resolver shared with the running server.
    pub fn resolver(&self) -> &Arc<KeyResolver> {
        &self.resolver
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends
        self._handle.abort();
    }
}
