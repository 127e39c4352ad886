//! Health check endpoint.

use axum::{http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Server time
    pub time: DateTime<Utc>,
}

/// Liveness check: 200 OK while the process is serving. Does not verify
/// dependencies.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            time: Utc::now(),
        }),
    )
}
