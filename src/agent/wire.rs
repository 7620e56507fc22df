// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire format of the agent zone stream.
//!
//! Every line of the response body is one JSON message tagged by `kind`:
//!
//! ```text
//! {"kind":"zone","name":"example.com","class":"IN","serial":2024010101,"type":"primary",
//!  "loaded_at":"2025-01-01T00:00:00Z","view_name":"_default","total_zone_count":2}
//! {"kind":"error","error":"busy","agent":"agent-1"}
//! ```
//!
//! An error message is always the last line.

use crate::errors::AgentError;
use crate::zone::{ExtendedZone, Zone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the zone stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    Zone(WireZone),
    Error(WireError),
}

/// A zone as sent by the agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireZone {
    pub name: String,
    pub class: String,
    pub serial: u32,
    #[serde(rename = "type")]
    pub zone_type: String,
    pub loaded_at: DateTime<Utc>,
    pub view_name: String,
    pub total_zone_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Kind of terminal error reported by the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    Busy,
    NotInited,
    Other,
}

/// Terminal error sent by the agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub error: WireErrorKind,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WireZone {
    /// Build the wire form of a zone held by an agent.
    #[must_use]
    pub fn from_zone(zone: &Zone, total_zone_count: i64) -> Self {
        Self {
            name: zone.name.clone(),
            class: zone.class.clone(),
            serial: zone.serial,
            zone_type: zone.zone_type.clone(),
            loaded_at: zone.loaded_at,
            view_name: zone.view_name().to_string(),
            total_zone_count,
            url: zone.url.clone(),
        }
    }

    /// Tag the zone with the daemon it was requested for.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Other`] for a zone without a name or view.
    pub fn into_extended(self, daemon_id: i64) -> Result<ExtendedZone, AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Other(
                "Agent sent a zone without a name".to_string(),
            ));
        }
        if self.view_name.trim().is_empty() {
            return Err(AgentError::Other(format!(
                "Agent sent zone {} without a view",
                self.name
            )));
        }
        Ok(ExtendedZone {
            zone: Zone {
                name: self.name,
                class: self.class,
                serial: self.serial,
                zone_type: self.zone_type,
                loaded_at: self.loaded_at,
                view: Some(self.view_name),
                url: self.url,
            },
            daemon_id,
            total_zone_count: self.total_zone_count,
        })
    }
}

impl From<WireError> for AgentError {
    fn from(err: WireError) -> Self {
        match err.error {
            WireErrorKind::Busy => AgentError::Busy { agent: err.agent },
            WireErrorKind::NotInited => AgentError::NotInited { agent: err.agent },
            WireErrorKind::Other => AgentError::Other(
                err.message
                    .unwrap_or_else(|| format!("Agent {} failed to list zones", err.agent)),
            ),
        }
    }
}

impl WireMessage {
    /// Encode the message as one line, including the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Decode one line of the stream into a zone or the terminal error.
///
/// # Errors
///
/// The terminal error sent by the agent, or [`AgentError::Other`] if the line
/// is not a valid message.
pub fn decode_line(line: &[u8], daemon_id: i64) -> Result<ExtendedZone, AgentError> {
    let message: WireMessage = serde_json::from_slice(line)
        .map_err(|e| AgentError::Other(format!("Invalid message from agent: {e}")))?;
    match message {
        WireMessage::Zone(zone) => zone.into_extended(daemon_id),
        WireMessage::Error(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod wire_tests;
