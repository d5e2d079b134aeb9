//! Configuration module for the channel purger.
//!
//! The purger is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [discord]
//! bot_token = "${DISCORD_BOT_TOKEN}"
//!
//! [purge]
//! max_iterations = 200
//! ```

mod discord;
mod observability;
mod purge;
mod server;

use std::path::Path;

pub use discord::*;
pub use observability::*;
pub use purge::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration for the purger.
///
/// All sections are optional with defaults, except that a bot token must
/// end up in `[discord]` for validation to pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgerConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote message store API configuration (credentials, base URL, retries).
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Purge loop policy: iteration cap, cooldowns, bulk age ceiling.
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PurgerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: PurgerConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.discord.validate()?;
        self.purge.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Default configuration used when no config file is given.
///
/// The token is pulled from the environment so the binary works with nothing
/// but `DISCORD_BOT_TOKEN` set.
pub fn default_config_toml() -> &'static str {
    r#"# Channel purger configuration

[server]
host = "127.0.0.1"
port = 8080

[discord]
api_base_url = "https://discord.com/api/v10"
bot_token = "${DISCORD_BOT_TOKEN}"

[discord.rate_limit]
max_retries = 6
default_retry_after_ms = 1000
max_retry_after_ms = 60000
max_jitter_ms = 200

[purge]
max_iterations = 200
bulk_max_age_days = 14
bulk_cooldown_ms = 250
fallback_cooldown_ms = 250
individual_cooldown_ms = 300
batch_cooldown_ms = 300

[observability.logging]
level = "info"
format = "compact"
"#
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables that appear after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid interpolation pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
