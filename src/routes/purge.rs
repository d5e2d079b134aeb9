//! `POST /api/purge`: empty a channel and report how much was removed.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use dashmap::DashSet;
use http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::{
    AppState,
    purge::{PurgeAborted, PurgeError, PurgeReport},
};

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    /// Snowflake id; numeric JSON values are accepted and stringified.
    #[serde(default, deserialize_with = "channel_id")]
    pub channel_id: Option<String>,
}

fn channel_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
    .filter(|id| !id.is_empty()))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: PurgeReport,
}

/// Error body returned by the API.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    total_deleted: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            total_deleted: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_deleted: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            code: self.code,
            total_deleted: self.total_deleted,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PurgeAborted> for ApiError {
    fn from(aborted: PurgeAborted) -> Self {
        let status = match aborted.error {
            PurgeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: aborted.error.code(),
            message: aborted.error.to_string(),
            total_deleted: Some(aborted.report.total_deleted),
        }
    }
}

/// Channels currently being purged by this process.
#[derive(Debug, Clone, Default)]
pub struct ActivePurges(Arc<DashSet<String>>);

impl ActivePurges {
    /// Claim `channel_id`, or `None` if a run already holds it.
    pub fn try_acquire(&self, channel_id: &str) -> Option<ActivePurgeGuard> {
        self.0.insert(channel_id.to_string()).then(|| ActivePurgeGuard {
            set: self.0.clone(),
            channel_id: channel_id.to_string(),
        })
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.0.contains(channel_id)
    }
}

/// Releases the channel when dropped.
#[derive(Debug)]
pub struct ActivePurgeGuard {
    set: Arc<DashSet<String>>,
    channel_id: String,
}

impl Drop for ActivePurgeGuard {
    fn drop(&mut self) {
        self.set.remove(&self.channel_id);
    }
}

fn authorize(headers: &HeaderMap, api_key: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = api_key else {
        return Ok(());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let matches: bool = match provided {
        Some(key) => key.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    };

    if matches {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "A valid API key is required",
        ))
    }
}

/// Purge every message in a channel.
///
/// Responds once the run is done. Deletions made before a failure are not
/// rolled back; the error body carries the partial `total_deleted`.
#[tracing::instrument(name = "api.purge", skip_all)]
pub async fn api_purge(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PurgeRequest>, JsonRejection>,
) -> Result<Json<PurgeResponse>, ApiError> {
    authorize(&headers, state.config.server.api_key.as_deref())?;

    let Json(request) = payload
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", e.body_text()))?;
    let channel_id = request.channel_id.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing_channel_id",
            "channel_id is required",
        )
    })?;

    let _guard = state.active_purges.try_acquire(&channel_id).ok_or_else(|| {
        ApiError::new(
            StatusCode::CONFLICT,
            "purge_in_progress",
            format!("channel {channel_id} is already being purged"),
        )
    })?;

    let report = state.purger.purge(&channel_id, &state.shutdown).await?;

    Ok(Json(PurgeResponse {
        success: true,
        report,
    }))
}
