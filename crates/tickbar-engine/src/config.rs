//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tickbar_aggregate::AggregatorConfig;
use tickbar_store::RetryPolicy;
use tickbar_types::{DEFAULT_SOURCE, Interval};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config '{path}': {source}")]
    Read {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for [`EngineConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(&'static str),
}

/// Settings for an [`Engine`](crate::Engine).
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bar interval.
    pub interval: Interval,
    /// Number of aggregation shards.
    pub shards: usize,
    /// Queue depth per shard and for the retrier.
    pub queue_capacity: usize,
    /// Bound on a single store write, in milliseconds.
    pub store_timeout_ms: u64,
    /// Bound on a single subscriber call, in milliseconds.
    pub subscriber_timeout_ms: u64,
    /// Bound on the whole shutdown sequence, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Source tag stamped on every bar.
    pub source: String,
    /// Backoff for failed store writes.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            shards: std::thread::available_parallelism().map_or(4, |n| n.get()),
            queue_capacity: 1024,
            store_timeout_ms: 2_000,
            subscriber_timeout_ms: 5_000,
            shutdown_timeout_ms: 30_000,
            source: DEFAULT_SOURCE.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::Invalid("shards must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be positive"));
        }
        if self.subscriber_timeout_ms == 0 {
            return Err(ConfigError::Invalid("subscriber_timeout_ms must be positive"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Invalid("shutdown_timeout_ms must be positive"));
        }
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("source must not be empty"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }

    /// Store write bound.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Subscriber call bound.
    #[must_use]
    pub const fn subscriber_timeout(&self) -> Duration {
        Duration::from_millis(self.subscriber_timeout_ms)
    }

    /// Shutdown bound.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub(crate) fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            interval: self.interval,
            shards: self.shards,
            queue_capacity: self.queue_capacity,
            source: self.source.clone(),
        }
    }
}
