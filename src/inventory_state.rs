// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-daemon outcome of the last zone fetch.
//!
//! Every fetch attempt ends with exactly one [`DaemonFetchResult`] per daemon.
//! The result is published in the fetch notification and persisted as a
//! [`ZoneInventoryState`] row keyed by daemon id, replacing the previous one.
//!
//! | Stream outcome            | Status          | Error          | Zone count |
//! |---------------------------|-----------------|----------------|------------|
//! | completed                 | `ok`            | -              | reported   |
//! | [`AgentError::Busy`]      | `busy`          | agent message  | -          |
//! | [`AgentError::NotInited`] | `uninitialized` | agent message  | -          |
//! | anything else             | `erred`         | error message  | -          |

use crate::errors::AgentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of the last fetch for one daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    /// All zones received and stored
    Ok,
    /// Agent inventory was busy
    Busy,
    /// Agent inventory was never initialized
    Uninitialized,
    /// Transport, store or cancellation failure
    Erred,
}

impl InventoryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InventoryStatus::Ok => "ok",
            InventoryStatus::Busy => "busy",
            InventoryStatus::Uninitialized => "uninitialized",
            InventoryStatus::Erred => "erred",
        }
    }
}

impl fmt::Display for InventoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(InventoryStatus::Ok),
            "busy" => Ok(InventoryStatus::Busy),
            "uninitialized" => Ok(InventoryStatus::Uninitialized),
            "erred" => Ok(InventoryStatus::Erred),
            other => Err(format!("unknown inventory status '{other}'")),
        }
    }
}

/// Outcome of fetching zones from one daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonFetchResult {
    pub status: InventoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<i64>,
}

impl DaemonFetchResult {
    /// All zones were received and committed.
    #[must_use]
    pub fn ok(zone_count: i64) -> Self {
        Self {
            status: InventoryStatus::Ok,
            error: None,
            zone_count: Some(zone_count),
        }
    }

    /// Map a terminal stream error to a result.
    #[must_use]
    pub fn from_agent_error(err: &AgentError) -> Self {
        let status = match err {
            AgentError::Busy { .. } => InventoryStatus::Busy,
            AgentError::NotInited { .. } => InventoryStatus::Uninitialized,
            AgentError::Other(_) => InventoryStatus::Erred,
        };
        Self {
            status,
            error: Some(err.to_string()),
            zone_count: None,
        }
    }

    /// Any failure that is not reported by the agent, e.g. a store error.
    #[must_use]
    pub fn erred(message: impl Into<String>) -> Self {
        Self {
            status: InventoryStatus::Erred,
            error: Some(message.into()),
            zone_count: None,
        }
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::from_agent_error(&AgentError::cancelled())
    }
}

/// Persisted outcome of the last fetch for one daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInventoryState {
    /// Daemon the state belongs to (unique)
    pub daemon_id: i64,
    /// When the state was recorded
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: DaemonFetchResult,
}

impl ZoneInventoryState {
    #[must_use]
    pub fn new(daemon_id: i64, result: DaemonFetchResult) -> Self {
        Self {
            daemon_id,
            created_at: Utc::now(),
            result,
        }
    }

    #[must_use]
    pub fn status(&self) -> InventoryStatus {
        self.result.status
    }
}

#[cfg(test)]
#[path = "inventory_state_tests.rs"]
mod inventory_state_tests;
