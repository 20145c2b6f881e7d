//! Protected sample resource.
//!
//! Echoes a few verified claims back to the caller so clients can confirm
//! end-to-end that their token was accepted.

use crate::auth::VerifiedClaims;
use axum::{Extension, Json};
use chrono::SecondsFormat;
use serde::Serialize;
use tracing::instrument;

/// Response for `GET /api/data`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse {
    pub message: String,

    /// Token subject.
    pub subject: String,

    /// Granted scopes as the space-separated string from the token.
    pub scopes: String,

    /// Token expiry, RFC 3339 UTC.
    pub expires_at: String,
}

/// Handler for GET /api/data
///
/// Requires `read:generic_data`; the route's middleware enforces it.
///
/// ```json
/// {
///   "message": "You have access to generic data!",
///   "subject": "user-42",
///   "scopes": "read:generic_data",
///   "expiresAt": "2030-03-17T17:46:40Z"
/// }
/// ```
#[instrument(skip_all, name = "gateway.handlers.data")]
pub async fn get_data(Extension(claims): Extension<VerifiedClaims>) -> Json<DataResponse> {
    tracing::debug!(target: "gateway.handlers.data", "Returning generic data");

    Json(DataResponse {
        message: "You have access to generic data!".to_string(),
        subject: claims.subject().to_string(),
        scopes: claims.scope_string(),
        expires_at: claims
            .expires_at()
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
