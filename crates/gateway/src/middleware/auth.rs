//! Authentication and authorization middleware for protected routes.
//!
//! `require_auth` extracts the Bearer token from the Authorization header,
//! validates it, and injects [`VerifiedClaims`] into request extensions.
//! `require_scopes` must run after it and checks those claims against the
//! route's [`RequiredScopes`].

use crate::auth::{authorize, AuthError, Authenticator, RequiredScopes, VerifiedClaims};
use crate::errors::GatewayError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Authentication pipeline (verifier and key resolver).
    pub authenticator: Arc<Authenticator>,
}

/// Authentication middleware that validates JWT tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if token is missing or invalid
/// - Continues to next handler with claims in extensions if token is valid
#[instrument(skip(state, req, next), name = "gateway.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let header = match req.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AuthError::MalformedCredential("non-visible ASCII in header"))?
                .to_owned(),
        ),
    };

    let claims = state.authenticator.authenticate(header.as_deref()).await?;

    // Store claims in request extensions for downstream handlers
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Scope middleware. Layer it inside `require_auth`.
///
/// # Response
///
/// - 403 Forbidden naming the required scopes if none is granted
/// - 500 if no claims are attached (layers applied in the wrong order)
#[instrument(skip(required, req, next), name = "gateway.middleware.scopes")]
pub async fn require_scopes(
    State(required): State<RequiredScopes>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let Some(claims) = req.extensions().get::<VerifiedClaims>() else {
        tracing::error!(
            target: "gateway.middleware.auth",
            "Claims not found in request extensions for scope check; require_auth must run first"
        );
        return Err(GatewayError::Internal(
            "claims missing from request extensions".to_string(),
        ));
    };

    authorize(claims, &required)?;

    Ok(next.run(req).await)
}
