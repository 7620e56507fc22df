// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process implementation of [`ZoneStore`].
//!
//! Tables are kept behind a single mutex, so every operation is atomic. Unique
//! keys and upsert behavior follow the SQL schema of [`super::SqliteStore`].
//! Failures can be injected to exercise retry handling.

use super::{LocalZone, ZoneStore};
use crate::dns_name::canonical_name;
use crate::errors::StoreError;
use crate::inventory_state::ZoneInventoryState;
use crate::zone::{AppType, Daemon, ExtendedZone, Zone};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct AppRow {
    app_type: AppType,
    agent_address: String,
}

#[derive(Debug)]
struct DaemonRow {
    app_id: i64,
    name: String,
}

#[derive(Debug, Clone)]
struct LocalZoneRow {
    class: String,
    zone_type: String,
    serial: u32,
    loaded_at: DateTime<Utc>,
    url: Option<String>,
    fetch_id: i64,
}

/// `(daemon_id, view, zone_id)`
type LocalZoneKey = (i64, String, i64);

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    apps: BTreeMap<i64, AppRow>,
    daemons: BTreeMap<i64, DaemonRow>,
    /// canonical name -> zone id
    zones: BTreeMap<String, i64>,
    local_zones: BTreeMap<LocalZoneKey, LocalZoneRow>,
    states: BTreeMap<i64, ZoneInventoryState>,
    injected_failures: VecDeque<StoreError>,
    committed_batches: u64,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Zone store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }

    /// Register an app and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn add_app(&self, app_type: AppType, agent_address: &str) -> Result<i64, StoreError> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        tables.apps.insert(
            id,
            AppRow {
                app_type,
                agent_address: agent_address.to_string(),
            },
        );
        Ok(id)
    }

    /// Register a daemon of an existing app.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if the app does not exist.
    pub fn add_daemon(&self, app_id: i64, name: &str) -> Result<Daemon, StoreError> {
        let mut tables = self.tables()?;
        let Some(app) = tables.apps.get(&app_id) else {
            return Err(StoreError::InvalidData(format!("app {app_id} does not exist")));
        };
        let (app_type, agent_address) = (app.app_type, app.agent_address.clone());
        let id = tables.allocate_id();
        tables.daemons.insert(
            id,
            DaemonRow {
                app_id,
                name: name.to_string(),
            },
        );
        Ok(Daemon {
            id,
            name: name.to_string(),
            app_id,
            app_type,
            agent_address,
        })
    }

    /// Make the next `commit_zone_batch` calls fail with the given errors, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn inject_commit_failures(
        &self,
        failures: impl IntoIterator<Item = StoreError>,
    ) -> Result<(), StoreError> {
        self.tables()?.injected_failures.extend(failures);
        Ok(())
    }

    /// Number of batch transactions committed so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn committed_batches(&self) -> Result<u64, StoreError> {
        Ok(self.tables()?.committed_batches)
    }
}

#[async_trait]
impl ZoneStore for MemoryStore {
    async fn list_dns_daemons(&self) -> Result<Vec<Daemon>, StoreError> {
        let tables = self.tables()?;
        let mut daemons = Vec::new();
        for (id, daemon) in &tables.daemons {
            let Some(app) = tables.apps.get(&daemon.app_id) else {
                continue;
            };
            if app.app_type.is_dns() {
                daemons.push(Daemon {
                    id: *id,
                    name: daemon.name.clone(),
                    app_id: daemon.app_id,
                    app_type: app.app_type,
                    agent_address: app.agent_address.clone(),
                });
            }
        }
        Ok(daemons)
    }

    async fn commit_zone_batch(
        &self,
        daemon_id: i64,
        fetch_id: i64,
        zones: &[ExtendedZone],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if let Some(failure) = tables.injected_failures.pop_front() {
            return Err(failure);
        }
        if !tables.daemons.contains_key(&daemon_id) {
            return Err(StoreError::DaemonNotFound(daemon_id));
        }

        for zone in zones {
            let name = canonical_name(zone.name());
            let existing = tables.zones.get(&name).copied();
            let zone_id = match existing {
                Some(id) => id,
                None => {
                    let id = tables.allocate_id();
                    tables.zones.insert(name, id);
                    id
                }
            };
            tables.local_zones.insert(
                (daemon_id, zone.view().to_string(), zone_id),
                LocalZoneRow {
                    class: zone.zone.class.clone(),
                    zone_type: zone.zone.zone_type.clone(),
                    serial: zone.zone.serial,
                    loaded_at: zone.zone.loaded_at,
                    url: zone.zone.url.clone(),
                    fetch_id,
                },
            );
        }
        tables.committed_batches += 1;
        Ok(())
    }

    async fn sweep_stale_local_zones(
        &self,
        daemon_id: i64,
        fetch_id: i64,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables()?;
        let before = tables.local_zones.len();
        tables
            .local_zones
            .retain(|(daemon, _, _), row| *daemon != daemon_id || row.fetch_id == fetch_id);
        let removed = before - tables.local_zones.len();

        let referenced: HashSet<i64> = tables
            .local_zones
            .keys()
            .map(|(_, _, zone_id)| *zone_id)
            .collect();
        tables.zones.retain(|_, id| referenced.contains(id));

        Ok(removed as u64)
    }

    async fn upsert_inventory_state(&self, state: &ZoneInventoryState) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if !tables.daemons.contains_key(&state.daemon_id) {
            return Err(StoreError::DaemonNotFound(state.daemon_id));
        }
        tables.states.insert(state.daemon_id, state.clone());
        Ok(())
    }

    async fn list_inventory_states(&self) -> Result<Vec<ZoneInventoryState>, StoreError> {
        Ok(self.tables()?.states.values().cloned().collect())
    }

    async fn list_daemon_zones(&self, daemon_id: i64) -> Result<Vec<Zone>, StoreError> {
        let tables = self.tables()?;
        let names: HashMap<i64, &str> = tables
            .zones
            .iter()
            .map(|(name, id)| (*id, name.as_str()))
            .collect();
        Ok(tables
            .local_zones
            .range((daemon_id, String::new(), i64::MIN)..)
            .take_while(|((daemon, _, _), _)| *daemon == daemon_id)
            .filter_map(|((_, view, zone_id), row)| {
                names.get(zone_id).map(|name| Zone {
                    name: (*name).to_string(),
                    class: row.class.clone(),
                    serial: row.serial,
                    zone_type: row.zone_type.clone(),
                    loaded_at: row.loaded_at,
                    view: Some(view.clone()),
                    url: row.url.clone(),
                })
            })
            .collect())
    }

    async fn list_local_zones(&self, zone_name: &str) -> Result<Vec<LocalZone>, StoreError> {
        let tables = self.tables()?;
        let name = canonical_name(zone_name);
        let Some(zone_id) = tables.zones.get(&name).copied() else {
            return Ok(Vec::new());
        };
        Ok(tables
            .local_zones
            .iter()
            .filter(|((_, _, id), _)| *id == zone_id)
            .map(|((daemon_id, view, _), row)| LocalZone {
                daemon_id: *daemon_id,
                zone_id,
                zone_name: name.clone(),
                view: view.clone(),
                class: row.class.clone(),
                zone_type: row.zone_type.clone(),
                serial: row.serial,
                loaded_at: row.loaded_at,
                url: row.url.clone(),
                fetch_id: row.fetch_id,
            })
            .collect())
    }

    async fn count_zones(&self) -> Result<u64, StoreError> {
        Ok(self.tables()?.zones.len() as u64)
    }

    async fn count_local_zones(&self) -> Result<u64, StoreError> {
        Ok(self.tables()?.local_zones.len() as u64)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
