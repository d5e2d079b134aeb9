//! REST client for the chat platform's channel message API.

mod messages;
#[cfg(test)]
pub(crate) mod test_utils;
mod transport;

pub use messages::DiscordMessageStore;
pub use transport::{
    ApiRequest, RateLimitedTransport, TransportError, retry_after_from_body,
    retry_after_from_headers,
};

use crate::purge::PurgeError;

impl From<TransportError> for PurgeError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::RateLimitExceeded { route, attempts } => {
                PurgeError::RateLimitExceeded { route, attempts }
            }
            TransportError::Request(e) => PurgeError::Request(e),
            TransportError::InvalidUrl(msg) => PurgeError::InvalidArgument(msg),
            TransportError::InvalidHeader(name) => {
                PurgeError::InvalidArgument(format!("invalid value for header {name}"))
            }
        }
    }
}
