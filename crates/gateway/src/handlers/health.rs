//! Health check handler.

use axum::Json;
use serde::Serialize;
use tracing::instrument;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe. Unauthenticated and independent of the identity provider.
///
/// ```json
/// { "status": "healthy" }
/// ```
#[instrument(skip_all, name = "gateway.health.check")]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
