// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone catalog types shared by the agent transport, the fetch pipeline and the store.

use crate::constants::DEFAULT_VIEW;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A zone catalog entry as reported by a DNS server.
///
/// Within one daemon and view the zone name is unique. The same name may be
/// served by many daemons.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Zone name, e.g. `example.com`
    pub name: String,
    /// DNS class, e.g. `IN` or `CH`
    pub class: String,
    /// SOA serial
    pub serial: u32,
    /// Zone type as reported by the server (`primary`, `secondary`, `builtin`, ...)
    #[serde(rename = "type")]
    pub zone_type: String,
    /// Time the server loaded the zone
    pub loaded_at: DateTime<Utc>,
    /// View the zone belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    /// Optional reference to the zone on the server (PowerDNS API URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Zone {
    /// View name, falling back to [`DEFAULT_VIEW`] when the server reported none.
    #[must_use]
    pub fn view_name(&self) -> &str {
        self.view.as_deref().unwrap_or(DEFAULT_VIEW)
    }
}

/// A zone received from an agent, tagged with the daemon that serves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedZone {
    /// The zone itself
    pub zone: Zone,
    /// Daemon that reported the zone
    pub daemon_id: i64,
    /// Total number of zones the agent holds for the daemon. Only used for progress
    /// reporting; never persisted per zone.
    pub total_zone_count: i64,
}

impl ExtendedZone {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.zone.name
    }

    #[must_use]
    pub fn view(&self) -> &str {
        self.zone.view_name()
    }
}

/// Application types known to the inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    /// ISC BIND 9
    Bind9,
    /// PowerDNS authoritative server
    #[serde(rename = "pdns")]
    PowerDns,
    /// ISC Kea DHCP (never asked for zones)
    Kea,
}

impl AppType {
    /// Whether daemons of this type serve DNS zones.
    #[must_use]
    pub fn is_dns(self) -> bool {
        matches!(self, AppType::Bind9 | AppType::PowerDns)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AppType::Bind9 => "bind9",
            AppType::PowerDns => "pdns",
            AppType::Kea => "kea",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bind9" => Ok(AppType::Bind9),
            "pdns" | "powerdns" => Ok(AppType::PowerDns),
            "kea" => Ok(AppType::Kea),
            other => Err(format!("unknown app type '{other}'")),
        }
    }
}

/// A server process known to the inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Daemon {
    /// Daemon id in the store
    pub id: i64,
    /// Daemon name as known to its agent, e.g. `named` or `pdns`
    pub name: String,
    /// App the daemon belongs to
    pub app_id: i64,
    /// Type of that app
    pub app_type: AppType,
    /// Address of the agent API serving this daemon, e.g. `agent-1:8080`
    pub agent_address: String,
}

/// Narrows the zones an agent returns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneFilter {
    /// Only zones in this view
    pub view: Option<String>,
    /// Only zones ordered strictly after this name
    pub lower_bound: Option<String>,
    /// At most this many zones
    pub limit: Option<usize>,
}

#[cfg(test)]
#[path = "zone_tests.rs"]
mod zone_tests;
