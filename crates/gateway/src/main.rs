//! Authentication Gateway
//!
//! Entry point. Loads configuration, fetches the provider's signing keys
//! and serves the HTTP API until SIGINT/SIGTERM.

use gateway::auth::{Authenticator, KeyResolver, TokenVerifier};
use gateway::config::Config;
use gateway::routes;
use gateway::tasks::start_jwks_refresh;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal in deployed environments
    let dotenv_result = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=debug,common=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Authentication Gateway");

    if let Err(e) = dotenv_result {
        info!("No .env file found, relying on environment variables ({})", e);
    }

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        issuer = %config.issuer_url,
        audience = %config.audience,
        jwks_url = %config.jwks_url,
        bind_address = %config.bind_address,
        allowed_algorithms = ?config.allowed_algorithms,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    // The gateway cannot verify anything without keys, so this is fatal
    info!("Fetching signing keys...");
    let resolver = Arc::new(
        KeyResolver::initialize(config.jwks_url.clone())
            .await
            .map_err(|e| {
                error!("Failed to load JWKS: {}", e);
                e
            })?,
    );

    let verifier = TokenVerifier::new(Arc::clone(&resolver), config.auth_config());
    let authenticator = Arc::new(Authenticator::new(verifier));

    // Start background key refresh
    let cancel_token = CancellationToken::new();
    let refresh_handle = config.jwks_refresh_interval.map(|period| {
        tokio::spawn(start_jwks_refresh(
            Arc::clone(&resolver),
            period,
            cancel_token.child_token(),
        ))
    });
    if refresh_handle.is_none() {
        info!("Periodic JWKS refresh disabled (JWKS_REFRESH_INTERVAL_SECONDS=0)");
    }

    // Build application routes
    let app = routes::build_routes(authenticator);

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Authentication Gateway listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.drain_seconds))
        .await?;

    cancel_token.cancel();
    if let Some(handle) = refresh_handle {
        if let Err(e) = handle.await {
            warn!("JWKS refresh task ended abnormally: {}", e);
        }
    }

    info!("Authentication Gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GATEWAY_DRAIN_SECONDS=0)");
    }
}
