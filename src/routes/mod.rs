pub mod health;
pub mod purge;

use axum::{Router, routing::post};

pub use purge::{ActivePurgeGuard, ActivePurges, ApiError, PurgeRequest, PurgeResponse};

use crate::AppState;

/// Routes mounted under `/api`.
pub fn get_api_routes() -> Router<AppState> {
    Router::new().route("/purge", post(purge::api_purge))
}
