//! Purge loop policy configuration.
//!
//! # Example
//!
//! ```toml
//! [purge]
//! max_iterations = 200
//! bulk_max_age_days = 14
//! bulk_cooldown_ms = 250
//! fallback_cooldown_ms = 250
//! individual_cooldown_ms = 300
//! batch_cooldown_ms = 300
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::purge::BULK_DELETE_MAX_AGE_DAYS;

/// Minimum spacing after a bulk chunk and between fallback deletes.
const MIN_BULK_COOLDOWN_MS: u64 = 250;

/// Minimum spacing between individual deletes of old messages and between batches.
const MIN_INDIVIDUAL_COOLDOWN_MS: u64 = 300;

/// Policy for one purge run.
///
/// The cooldowns are proactive pacing independent of 429 backoff. Their
/// floors match the sustained per-route rates the platform tolerates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Safety cap on fetch iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Messages younger than this many days go through bulk delete.
    #[serde(default = "default_bulk_max_age_days")]
    pub bulk_max_age_days: u32,

    /// Pause after each bulk chunk.
    #[serde(default = "default_bulk_cooldown_ms")]
    pub bulk_cooldown_ms: u64,

    /// Pause between per-id deletes after a rejected bulk request.
    #[serde(default = "default_fallback_cooldown_ms")]
    pub fallback_cooldown_ms: u64,

    /// Pause between individual deletes of messages too old for bulk delete.
    #[serde(default = "default_individual_cooldown_ms")]
    pub individual_cooldown_ms: u64,

    /// Pause before fetching the next batch.
    #[serde(default = "default_batch_cooldown_ms")]
    pub batch_cooldown_ms: u64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            bulk_max_age_days: default_bulk_max_age_days(),
            bulk_cooldown_ms: default_bulk_cooldown_ms(),
            fallback_cooldown_ms: default_fallback_cooldown_ms(),
            individual_cooldown_ms: default_individual_cooldown_ms(),
            batch_cooldown_ms: default_batch_cooldown_ms(),
        }
    }
}

impl PurgeConfig {
    pub fn bulk_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.bulk_max_age_days))
    }

    pub fn bulk_cooldown(&self) -> Duration {
        Duration::from_millis(self.bulk_cooldown_ms)
    }

    pub fn fallback_cooldown(&self) -> Duration {
        Duration::from_millis(self.fallback_cooldown_ms)
    }

    pub fn individual_cooldown(&self) -> Duration {
        Duration::from_millis(self.individual_cooldown_ms)
    }

    pub fn batch_cooldown(&self) -> Duration {
        Duration::from_millis(self.batch_cooldown_ms)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "purge.max_iterations must be at least 1".into(),
            ));
        }

        if self.bulk_max_age_days == 0 || self.bulk_max_age_days > BULK_DELETE_MAX_AGE_DAYS {
            return Err(ConfigError::Validation(format!(
                "purge.bulk_max_age_days must be between 1 and {BULK_DELETE_MAX_AGE_DAYS} \
                 (the platform rejects older messages from bulk delete), got {}",
                self.bulk_max_age_days
            )));
        }

        let floors = [
            ("bulk_cooldown_ms", self.bulk_cooldown_ms, MIN_BULK_COOLDOWN_MS),
            ("fallback_cooldown_ms", self.fallback_cooldown_ms, MIN_BULK_COOLDOWN_MS),
            (
                "individual_cooldown_ms",
                self.individual_cooldown_ms,
                MIN_INDIVIDUAL_COOLDOWN_MS,
            ),
            ("batch_cooldown_ms", self.batch_cooldown_ms, MIN_INDIVIDUAL_COOLDOWN_MS),
        ];
        for (name, value, floor) in floors {
            if value < floor {
                return Err(ConfigError::Validation(format!(
                    "purge.{name} must be at least {floor} ms, got {value}"
                )));
            }
        }

        Ok(())
    }
}

fn default_max_iterations() -> u32 {
    200
}

fn default_bulk_max_age_days() -> u32 {
    BULK_DELETE_MAX_AGE_DAYS
}

fn default_bulk_cooldown_ms() -> u64 {
    MIN_BULK_COOLDOWN_MS
}

fn default_fallback_cooldown_ms() -> u64 {
    MIN_BULK_COOLDOWN_MS
}

fn default_individual_cooldown_ms() -> u64 {
    MIN_INDIVIDUAL_COOLDOWN_MS
}

fn default_batch_cooldown_ms() -> u64 {
    MIN_INDIVIDUAL_COOLDOWN_MS
}
