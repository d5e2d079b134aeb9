//! Channel message endpoints, exposed to the engine as a [`MessageStore`].

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Method};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ApiRequest, RateLimitedTransport, TransportError};
use crate::{
    config::DiscordConfig,
    purge::{
        BulkOutcome, DeleteOutcome, FETCH_LIMIT, Message, MessageStore, PurgeError,
        check_bulk_size,
    },
};

const AUDIT_LOG_REASON: HeaderName = HeaderName::from_static("x-audit-log-reason");

pub struct DiscordMessageStore {
    transport: RateLimitedTransport,
    audit_log_reason: Option<HeaderValue>,
}

impl DiscordMessageStore {
    pub fn new(transport: RateLimitedTransport) -> Self {
        Self {
            transport,
            audit_log_reason: None,
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self, TransportError> {
        let store = Self::new(RateLimitedTransport::from_config(config)?);
        match &config.audit_log_reason {
            Some(reason) => store.with_audit_log_reason(reason),
            None => Ok(store),
        }
    }

    /// Record `reason` in the guild audit log for every deletion.
    ///
    /// The platform expects the header value percent-encoded.
    pub fn with_audit_log_reason(mut self, reason: &str) -> Result<Self, TransportError> {
        let encoded = url::form_urlencoded::byte_serialize(reason.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        let value = HeaderValue::from_str(&encoded)
            .map_err(|_| TransportError::InvalidHeader("x-audit-log-reason"))?;
        self.audit_log_reason = Some(value);
        Ok(self)
    }

    fn with_reason(&self, request: ApiRequest) -> ApiRequest {
        match &self.audit_log_reason {
            Some(reason) => request.header(AUDIT_LOG_REASON, reason.clone()),
            None => request,
        }
    }
}

#[async_trait]
impl MessageStore for DiscordMessageStore {
    async fn fetch_batch(&self, channel_id: &str) -> Result<Vec<Message>, PurgeError> {
        let request = ApiRequest::new(Method::GET, ["channels", channel_id, "messages"])
            .query("limit", FETCH_LIMIT.to_string());

        let response = self.transport.send(&request).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(PurgeError::Request)?;

        if !status.is_success() {
            return Err(PurgeError::FetchFailed {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        parse_batch(status.as_u16(), &body)
    }

    async fn bulk_delete(
        &self,
        channel_id: &str,
        ids: &[String],
    ) -> Result<BulkOutcome, PurgeError> {
        check_bulk_size(ids)?;

        let request = self.with_reason(
            ApiRequest::new(
                Method::POST,
                ["channels", channel_id, "messages", "bulk-delete"],
            )
            .json(json!({ "messages": ids })),
        );

        let response = self.transport.send(&request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(BulkOutcome::Deleted);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            channel_id,
            status = status.as_u16(),
            count = ids.len(),
            body = %body,
            "Bulk delete rejected"
        );
        Ok(BulkOutcome::Rejected {
            status: status.as_u16(),
        })
    }

    async fn delete_one(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<DeleteOutcome, PurgeError> {
        let request = self.with_reason(ApiRequest::new(
            Method::DELETE,
            ["channels", channel_id, "messages", message_id],
        ));

        let response = self.transport.send(&request).await?;
        let status = response.status();
        let outcome = DeleteOutcome::from_status(status);

        match outcome {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::Skipped(reason) => {
                debug!(channel_id, message_id, ?reason, "Message not deletable, skipping");
            }
            DeleteOutcome::Failed { status } => {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    channel_id,
                    message_id,
                    status,
                    body = %body,
                    "Failed to delete message"
                );
            }
        }

        Ok(outcome)
    }
}

/// Decode a listing body.
///
/// An empty body or a non-array document is an empty channel. Entries that do
/// not look like messages are skipped.
fn parse_batch(status: u16, body: &[u8]) -> Result<Vec<Message>, PurgeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| PurgeError::FetchFailed {
        status,
        body: format!("invalid JSON in message listing: {e}"),
    })?;

    let Value::Array(entries) = value else {
        debug!("Message listing was not an array, treating as empty");
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}
