// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persistent zone inventory store.
//!
//! The store holds four logical tables:
//!
//! - `zone` - one row per distinct zone name, shared by every daemon serving it
//! - `local_zone` - association of a daemon and view with a `zone` row, carrying the
//!   per-daemon attributes (class, type, serial, loaded-at); unique on
//!   `(daemon_id, view, zone_id)`
//! - `zone_inventory_state` - outcome of the last fetch, unique on `daemon_id`
//! - `daemon`/`app` - the server processes zones are fetched from
//!
//! Both unique constraints are upserted with `ON CONFLICT ... DO UPDATE`, which is
//! what makes concurrent batches from different daemons reporting the same zone
//! safe. Zone names are stored in canonical form (see
//! [`crate::dns_name::canonical_name`]).
//!
//! # Implementations
//!
//! - [`sqlite::SqliteStore`] - SQLite database through `sqlx`
//! - [`memory::MemoryStore`] - in-process tables with the same key semantics

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::errors::StoreError;
use crate::inventory_state::ZoneInventoryState;
use crate::zone::{Daemon, ExtendedZone, Zone};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `local_zone` row joined with its zone name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalZone {
    pub daemon_id: i64,
    pub zone_id: i64,
    /// Canonical zone name
    pub zone_name: String,
    pub view: String,
    pub class: String,
    #[serde(rename = "type")]
    pub zone_type: String,
    pub serial: u32,
    pub loaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Fetch that last reported this association
    pub fetch_id: i64,
}

impl LocalZone {
    /// Convert back to the zone as the daemon reported it (with canonical name).
    #[must_use]
    pub fn to_zone(&self) -> Zone {
        Zone {
            name: self.zone_name.clone(),
            class: self.class.clone(),
            serial: self.serial,
            zone_type: self.zone_type.clone(),
            loaded_at: self.loaded_at,
            view: Some(self.view.clone()),
            url: self.url.clone(),
        }
    }
}

/// Storage operations used by the fetch pipeline and its readers.
///
/// Implementations must be safe to call concurrently from many fetch workers.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// List daemons of DNS apps (BIND 9 and PowerDNS), ordered by id.
    async fn list_dns_daemons(&self) -> Result<Vec<Daemon>, StoreError>;

    /// Upsert a batch of zones from one daemon in a single transaction.
    ///
    /// For every distinct name the `zone` row is inserted or reused; for every
    /// `(daemon, view, zone)` the `local_zone` row is inserted or updated with the
    /// reported attributes and stamped with `fetch_id`. Either all rows are written
    /// or none are. Callers coalesce duplicates before calling.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the transaction lost a race and may be
    /// retried; other variants are final.
    async fn commit_zone_batch(
        &self,
        daemon_id: i64,
        fetch_id: i64,
        zones: &[ExtendedZone],
    ) -> Result<(), StoreError>;

    /// Delete the daemon's `local_zone` rows not stamped with `fetch_id`, then
    /// delete `zone` rows no longer referenced by any daemon.
    ///
    /// Returns the number of `local_zone` rows removed.
    async fn sweep_stale_local_zones(&self, daemon_id: i64, fetch_id: i64)
        -> Result<u64, StoreError>;

    /// Insert or replace the inventory state of a daemon.
    async fn upsert_inventory_state(&self, state: &ZoneInventoryState) -> Result<(), StoreError>;

    /// All inventory states, ordered by daemon id.
    async fn list_inventory_states(&self) -> Result<Vec<ZoneInventoryState>, StoreError>;

    /// Zones served by a daemon, across all of its views.
    async fn list_daemon_zones(&self, daemon_id: i64) -> Result<Vec<Zone>, StoreError>;

    /// Associations of a zone with daemons, ordered by daemon id and view.
    async fn list_local_zones(&self, zone_name: &str) -> Result<Vec<LocalZone>, StoreError>;

    /// Number of `zone` rows.
    async fn count_zones(&self) -> Result<u64, StoreError>;

    /// Number of `local_zone` rows.
    async fn count_local_zones(&self) -> Result<u64, StoreError>;
}
