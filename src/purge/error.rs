use super::PurgeReport;

/// Failures that end a purge run.
///
/// Rejected bulk requests and skipped or failed single deletes are not
/// errors; they are reported through [`super::BulkOutcome`] and
/// [`super::DeleteOutcome`] and the run carries on.
#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    #[error("rate limited on {route}: gave up after {attempts} attempts")]
    RateLimitExceeded { route: String, attempts: u32 },

    #[error("failed to fetch messages (status {status}): {body}")]
    FetchFailed { status: u16, body: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("message store request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("purge cancelled")]
    Cancelled,
}

impl PurgeError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Request(_) => "upstream_unreachable",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A run that stopped on a fatal error. Deletions already made stay made;
/// `report` records how far the run got.
#[derive(Debug, thiserror::Error)]
#[error("purge of channel {} aborted after deleting {} messages: {error}", .report.channel_id, .report.total_deleted)]
pub struct PurgeAborted {
    #[source]
    pub error: PurgeError,
    pub report: PurgeReport,
}
