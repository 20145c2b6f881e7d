//! HTTP routes for the gateway.
//!
//! Defines the Axum router.

use crate::auth::scopes::READ_GENERIC_DATA;
use crate::auth::{Authenticator, RequiredScopes};
use crate::handlers;
use crate::middleware::{require_auth, require_scopes, AuthState};
use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (public)
/// - `/api/data` - Sample resource requiring `read:generic_data`
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(authenticator: Arc<Authenticator>) -> Router {
    let auth_state = Arc::new(AuthState { authenticator });

    // Public routes (no authentication required)
    let public_routes = Router::new().route("/health", get(handlers::health_check));

    // Protected routes. Layers run bottom-to-top: require_auth attaches the
    // claims, then require_scopes checks them.
    let protected_routes = Router::new()
        .route("/api/data", get(handlers::get_data))
        .layer(from_fn_with_state(
            RequiredScopes::any_of(&[READ_GENERIC_DATA]),
            require_scopes,
        ))
        .layer(from_fn_with_state(auth_state, require_auth));

    // The last layer added wraps everything before it:
    // 1. TimeoutLayer - bounds the whole request, tracing included (outermost)
    // 2. TraceLayer - logs each request inside the timeout
    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
