//! Message store API configuration.
//!
//! # Example
//!
//! ```toml
//! [discord]
//! api_base_url = "https://discord.com/api/v10"
//! bot_token = "${DISCORD_BOT_TOKEN}"
//! audit_log_reason = "Scheduled channel purge"
//!
//! [discord.rate_limit]
//! max_retries = 6
//! default_retry_after_ms = 1000
//! max_retry_after_ms = 60000
//! max_jitter_ms = 200
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, HttpClientConfig};

/// Connection details for the remote message store API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    /// Base URL of the REST API, including the version segment.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bot credential attached to every outgoing request.
    #[serde(default)]
    pub bot_token: String,

    /// Authorization scheme placed before the token.
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    /// Optional reason recorded in the guild audit log for deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_reason: Option<String>,

    /// Reactive 429 handling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Outbound HTTP client settings.
    #[serde(default)]
    pub http_client: HttpClientConfig,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            bot_token: String::new(),
            auth_scheme: default_auth_scheme(),
            audit_log_reason: None,
            rate_limit: RateLimitConfig::default(),
            http_client: HttpClientConfig::default(),
        }
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("api_base_url", &self.api_base_url)
            .field("bot_token", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .field("audit_log_reason", &self.audit_log_reason)
            .field("rate_limit", &self.rate_limit)
            .field("http_client", &self.http_client)
            .finish()
    }
}

impl DiscordConfig {
    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.auth_scheme, self.bot_token)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discord.bot_token is required".into(),
            ));
        }

        let url = url::Url::parse(&self.api_base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "discord.api_base_url '{}' is not a valid URL: {e}",
                self.api_base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ConfigError::Validation(format!(
                "discord.api_base_url '{}' must be an absolute http(s) URL",
                self.api_base_url
            )));
        }

        self.rate_limit.validate()
    }
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_auth_scheme() -> String {
    "Bot".to_string()
}

/// Handling of "too many requests" responses.
///
/// The wait comes from the response itself (a `retry-after` header or a
/// `retry_after` body field, both in seconds). The configured default is used
/// only when the response carries neither. A requested wait longer than
/// `max_retry_after_ms` is shortened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum number of retries after a 429 (not including the initial request).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait used when a 429 response carries no usable retry hint.
    #[serde(default = "default_retry_after_ms")]
    pub default_retry_after_ms: u64,

    /// Longest wait honoured for a single 429, whatever the response asks for.
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to every wait.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            default_retry_after_ms: default_retry_after_ms(),
            max_retry_after_ms: default_max_retry_after_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Compute the wait before retrying a rate-limited call.
    ///
    /// `hint` is the server-provided delay, if any. It is capped at
    /// `max_retry_after_ms`, then a random jitter in `[0, max_jitter_ms)` is
    /// added.
    pub fn backoff_delay(&self, hint: Option<Duration>) -> Duration {
        let base = hint
            .unwrap_or(Duration::from_millis(self.default_retry_after_ms))
            .min(Duration::from_millis(self.max_retry_after_ms));

        let jitter = if self.max_jitter_ms > 0 {
            use rand::Rng;
            rand::thread_rng().gen_range(0..self.max_jitter_ms)
        } else {
            0
        };

        base.saturating_add(Duration::from_millis(jitter))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "discord.rate_limit.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        if self.max_retry_after_ms < self.default_retry_after_ms {
            return Err(ConfigError::Validation(format!(
                "discord.rate_limit.max_retry_after_ms ({}) must be at least \
                 default_retry_after_ms ({})",
                self.max_retry_after_ms, self.default_retry_after_ms
            )));
        }
        if self.max_jitter_ms == 0 {
            return Err(ConfigError::Validation(
                "discord.rate_limit.max_jitter_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Retries past this point only prolong a run the platform is refusing.
const MAX_RETRIES_LIMIT: u32 = 100;

fn default_max_retries() -> u32 {
    6
}

fn default_retry_after_ms() -> u64 {
    1000
}

fn default_max_retry_after_ms() -> u64 {
    60_000
}

fn default_max_jitter_ms() -> u64 {
    200
}
