//! Queue configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which version of a record an atomic update returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDocument {
    /// The record as it was immediately before the update.
    Before,
    /// The record as it is immediately after the update.
    #[default]
    After,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid queue config: {0}")]
    Invalid(String),
}

/// Configuration for queue handle and consumer behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Delay between unsuccessful claim attempts (milliseconds).
    pub backoff_ms: u64,
    /// Suppress the "waiting" diagnostic while the queue is empty.
    pub silent: bool,
    /// Whether a claim returns the record before or after the update.
    pub returning: ReturnDocument,
    /// Consecutive store failures after which the consumer escalates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
    /// How long a job may stay `working` before it counts as stuck (seconds).
    pub stale_after_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 5_000,
            silent: false,
            returning: ReturnDocument::After,
            max_consecutive_failures: Some(10),
            stale_after_secs: 300, // 5 minutes default
        }
    }
}

impl QueueConfig {
    /// Build a config from environment variables.
    ///
    /// - `JOBQUEUE_BACKOFF_MS` (default: 5000)
    /// - `JOBQUEUE_SILENT` (`true`/`false`, default: false)
    /// - `JOBQUEUE_RETURNING` (`before`/`after`, default: after)
    /// - `JOBQUEUE_MAX_FAILURES` (`0` disables escalation, default: 10)
    /// - `JOBQUEUE_STALE_AFTER_SECS` (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("JOBQUEUE_BACKOFF_MS") {
            cfg.backoff_ms = parse_num("JOBQUEUE_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("JOBQUEUE_SILENT") {
            cfg.silent = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => return Err(invalid("JOBQUEUE_SILENT", &v)),
            };
        }
        if let Some(v) = lookup("JOBQUEUE_RETURNING") {
            cfg.returning = match v.trim().to_ascii_lowercase().as_str() {
                "before" => ReturnDocument::Before,
                "after" => ReturnDocument::After,
                _ => return Err(invalid("JOBQUEUE_RETURNING", &v)),
            };
        }
        if let Some(v) = lookup("JOBQUEUE_MAX_FAILURES") {
            let n: u32 = parse_num("JOBQUEUE_MAX_FAILURES", &v)?;
            cfg.max_consecutive_failures = (n > 0).then_some(n);
        }
        if let Some(v) = lookup("JOBQUEUE_STALE_AFTER_SECS") {
            cfg.stale_after_secs = parse_num("JOBQUEUE_STALE_AFTER_SECS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that would busy-loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_ms == 0 {
            return Err(ConfigError::Invalid("backoff must be greater than 0".into()));
        }
        Ok(())
    }

    /// Set the backoff between unsuccessful claim attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Silence the "waiting" diagnostic.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Choose which record version claims return.
    pub fn with_returning(mut self, returning: ReturnDocument) -> Self {
        self.returning = returning;
        self
    }

    /// Set the escalation threshold. `None` retries forever (still logged).
    pub fn with_max_consecutive_failures(mut self, max: Option<u32>) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Set the stuck-job threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after_secs = stale_after.as_secs();
        self
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}
