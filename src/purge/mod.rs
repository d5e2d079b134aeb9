//! Channel purge engine.
//!
//! A purge run repeatedly fetches the newest batch of messages, splits it by
//! age, and deletes it through the cheapest endpoint each message qualifies
//! for:
//!
//! 1. Messages younger than the bulk age ceiling go out in bulk requests of
//!    2-100 ids, falling back to per-id deletes when a bulk request is rejected.
//! 2. Older messages are deleted one at a time with wider spacing.
//! 3. The loop ends when a fetch comes back empty, when nothing fetched is
//!    still deletable, or when the iteration cap is hit.
//!
//! The engine talks to the remote API only through [`MessageStore`], so the
//! HTTP client lives in [`crate::discord`] and tests can substitute an
//! in-memory channel.

mod classify;
mod engine;
mod error;
mod message;
#[cfg(test)]
pub(crate) mod test_utils;

use async_trait::async_trait;
pub use classify::{BULK_DELETE_MAX_AGE_DAYS, Partition, classify};
pub use engine::{PurgeReport, Purger};
pub use error::{PurgeAborted, PurgeError};
use http::StatusCode;
pub use message::Message;

/// Messages returned by one listing call.
pub const FETCH_LIMIT: usize = 100;

/// Smallest id count the bulk endpoint accepts.
pub const BULK_DELETE_MIN: usize = 2;

/// Largest id count the bulk endpoint accepts.
pub const BULK_DELETE_MAX: usize = 100;

/// Access to a remote channel's messages.
///
/// Implementations surface rate-limit exhaustion and hard listing failures as
/// errors. Per-message and per-bulk rejections are ordinary outcomes.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch up to [`FETCH_LIMIT`] of the most recent messages, newest first.
    async fn fetch_batch(&self, channel_id: &str) -> Result<Vec<Message>, PurgeError>;

    /// Delete 2-100 messages in one request.
    ///
    /// Fails with [`PurgeError::InvalidArgument`] without touching the network
    /// when the id count is out of range.
    async fn bulk_delete(&self, channel_id: &str, ids: &[String])
    -> Result<BulkOutcome, PurgeError>;

    /// Delete a single message of any age.
    async fn delete_one(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<DeleteOutcome, PurgeError>;
}

/// Reject id counts the bulk endpoint would refuse.
pub fn check_bulk_size(ids: &[String]) -> Result<(), PurgeError> {
    if (BULK_DELETE_MIN..=BULK_DELETE_MAX).contains(&ids.len()) {
        Ok(())
    } else {
        Err(PurgeError::InvalidArgument(format!(
            "bulk delete requires between {BULK_DELETE_MIN} and {BULK_DELETE_MAX} ids, got {}",
            ids.len()
        )))
    }
}

/// Result of a bulk delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    /// Every id in the request was removed.
    Deleted,
    /// The endpoint refused the request; the ids must be retried individually.
    Rejected { status: u16 },
}

/// Why an individual delete removed nothing without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Forbidden,
}

/// Result of deleting a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Skipped(SkipReason),
    Failed { status: u16 },
}

impl DeleteOutcome {
    /// Map a delete response status onto the outcome policy:
    /// 2xx removes, 403/404 are expected skips, anything else failed.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            s if s.is_success() => Self::Deleted,
            StatusCode::FORBIDDEN => Self::Skipped(SkipReason::Forbidden),
            StatusCode::NOT_FOUND => Self::Skipped(SkipReason::NotFound),
            s => Self::Failed { status: s.as_u16() },
        }
    }

    /// Whether the message counts towards the deleted total.
    pub fn removed(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}
