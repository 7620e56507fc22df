// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime configuration.
//!
//! Settings are resolved in three layers, later layers winning:
//!
//! 1. defaults from [`crate::constants`]
//! 2. an optional YAML file
//! 3. `ZONE_INVENTORY_*` environment variables
//!
//! Command line flags are applied by the binary on top of the result.
//!
//! ```yaml
//! database_url: sqlite:///var/lib/zone-inventory/inventory.db
//! parallelism: 8
//! batch_size: 500
//! stream_timeout_secs: 600
//! ```

use crate::constants::{
    DEFAULT_AGENT_REQUEST_TIMEOUT_SECS, DEFAULT_DATABASE_URL, DEFAULT_FETCH_BATCH_SIZE,
    DEFAULT_FETCH_PARALLELISM, DEFAULT_STREAM_TIMEOUT_SECS, ENV_AGENT_REQUEST_TIMEOUT_SECS,
    ENV_BATCH_SIZE, ENV_DATABASE_URL, ENV_PARALLELISM, ENV_STREAM_TIMEOUT_SECS,
};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Zone inventory settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryConfig {
    /// sqlx connection URL of the SQLite database
    pub database_url: String,
    /// Maximum number of daemons fetched concurrently
    pub parallelism: usize,
    /// Number of zones per store transaction
    pub batch_size: usize,
    /// Soft timeout for receiving the zones of one daemon
    pub stream_timeout_secs: u64,
    /// Connect timeout for agent requests
    pub agent_request_timeout_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            parallelism: DEFAULT_FETCH_PARALLELISM,
            batch_size: DEFAULT_FETCH_BATCH_SIZE,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            agent_request_timeout_secs: DEFAULT_AGENT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl InventoryConfig {
    /// Load the configuration from an optional file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable holds an invalid value, or the result fails [`Self::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file. Missing settings keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse YAML configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML or unknown settings.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a numeric variable does not parse.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(value) = parse_env(&lookup, ENV_PARALLELISM)? {
            self.parallelism = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_BATCH_SIZE)? {
            self.batch_size = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_STREAM_TIMEOUT_SECS)? {
            self.stream_timeout_secs = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_AGENT_REQUEST_TIMEOUT_SECS)? {
            self.agent_request_timeout_secs = value;
        }
        Ok(self)
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty database URL or a zero
    /// count or timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url", "must not be empty"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism", "must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if self.stream_timeout_secs == 0 {
            return Err(invalid("stream_timeout_secs", "must be greater than zero"));
        }
        if self.agent_request_timeout_secs == 0 {
            return Err(invalid(
                "agent_request_timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    #[must_use]
    pub fn agent_request_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_request_timeout_secs)
    }
}

fn parse_env<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
