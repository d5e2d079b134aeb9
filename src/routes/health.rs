//! Health check endpoints for process supervisors and load balancers.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LivenessStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe.
///
/// Returns 200 while the process can serve requests. It does not contact the
/// message store API.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    Json(LivenessStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
