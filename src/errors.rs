// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the zone inventory.
//!
//! This module provides specialized error types for:
//! - Agent zone streams (busy, uninitialized and transport failures)
//! - The persistent store (retryable conflicts vs. hard database errors)
//! - The fetch manager control plane (already fetching, invalid parameters)
//! - Configuration loading
//!
//! Per-daemon errors never abort a fetch; they end up in the daemon's
//! inventory state and in the fetch notification.

use crate::constants::{FETCH_CANCELLED_MESSAGE, FETCH_TIMEOUT_MESSAGE};
use thiserror::Error;

/// Terminal error of an agent zone stream.
///
/// The three kinds survive the transport unchanged, so the pipeline can record
/// a busy agent differently from an agent that was never initialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The agent is still populating its zone inventory. Transient.
    #[error("Zone inventory is temporarily busy on the agent {agent}")]
    Busy {
        /// Agent that reported the condition
        agent: String,
    },

    /// The agent never loaded its zone inventory. Needs operator action.
    #[error("Zone inventory has not been initialized on the agent {agent}")]
    NotInited {
        /// Agent that reported the condition
        agent: String,
    },

    /// Any other failure: network, decoding, timeout or cancellation.
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Error reported for streams interrupted by fetch cancellation.
    #[must_use]
    pub fn cancelled() -> Self {
        AgentError::Other(FETCH_CANCELLED_MESSAGE.to_string())
    }

    /// Error reported for streams exceeding their soft timeout.
    #[must_use]
    pub fn timeout() -> Self {
        AgentError::Other(FETCH_TIMEOUT_MESSAGE.to_string())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Other(message) if message == FETCH_CANCELLED_MESSAGE)
    }
}

/// Errors returned by a [`crate::store::ZoneStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The transaction lost a race with a concurrent one (serialization failure,
    /// deadlock, lock contention). Retrying the whole transaction may succeed.
    #[error("Store transaction conflict: {0}")]
    Conflict(String),

    /// Referenced daemon does not exist
    #[error("Daemon {0} not found in the store")]
    DaemonNotFound(i64),

    /// A stored value could not be decoded
    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    /// Any other database failure. Not retried.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the failed operation may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Errors raised while flushing a batch of zones to the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// The fetch was cancelled before the batch committed; nothing was written
    #[error("cancelled")]
    Cancelled,

    /// The store rejected the batch, possibly after retries
    #[error("Failed to store zones after {attempts} attempt(s): {source}")]
    Store {
        /// Number of transactions attempted
        attempts: u32,
        /// Last store error
        #[source]
        source: StoreError,
    },
}

/// Errors returned synchronously by [`crate::manager::ZoneInventoryManager::fetch_zones`].
///
/// None of them leave a fetch session behind.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Another fetch is still running
    #[error("Zone fetch is already in progress")]
    AlreadyFetching,

    /// A fetch parameter is out of range
    #[error("Invalid fetch parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The daemons to fetch from could not be enumerated
    #[error("Failed to enumerate DNS daemons: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`crate::config::InventoryConfig`]
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment variable holds an unparsable value
    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// A setting is out of range
    #[error("Invalid configuration value for '{name}': {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
