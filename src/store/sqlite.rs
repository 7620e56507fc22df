// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! SQLite implementation of [`ZoneStore`] on top of `sqlx`.
//!
//! # Schema
//!
//! ```text
//! app(id, type, agent_address)
//! daemon(id, app_id -> app, name)
//! zone(id, name UNIQUE, created_at)
//! local_zone(id, daemon_id -> daemon, zone_id -> zone, view, class, zone_type,
//!            serial, loaded_at, url, fetch_id, UNIQUE(daemon_id, view, zone_id))
//! zone_inventory_state(id, daemon_id -> daemon UNIQUE, status, error, zone_count, created_at)
//! ```
//!
//! Every batch runs in one transaction whose first statement is a write, so a
//! competing writer makes it wait on the busy timeout instead of failing with a
//! stale snapshot. Lock errors that still escape are reported as
//! [`StoreError::Conflict`] and retried by the caller.

use super::{LocalZone, ZoneStore};
use crate::dns_name::canonical_name;
use crate::errors::StoreError;
use crate::inventory_state::{DaemonFetchResult, ZoneInventoryState};
use crate::zone::{AppType, Daemon, ExtendedZone, Zone};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How long a connection waits for a competing writer before giving up
const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

/// Connections in the pool of a file-backed database
const SQLITE_MAX_CONNECTIONS: u32 = 8;

/// SQLite (extended) result codes and SQLSTATEs that mean "try again".
///
/// `SQLITE_BUSY`, `SQLITE_LOCKED` and their extended variants, unique and
/// primary key violations, plus the serialization failure, deadlock and unique
/// violation SQLSTATEs for drivers that report those.
const RETRYABLE_CODES: &[&str] = &[
    "5", "6", "261", "262", "517", "773", "2067", "1555", "40001", "40P01", "23505",
];

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS app (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        agent_address TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS daemon (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        app_id INTEGER NOT NULL REFERENCES app (id) ON DELETE CASCADE,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS zone (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS local_zone (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        daemon_id INTEGER NOT NULL REFERENCES daemon (id) ON DELETE CASCADE,
        zone_id INTEGER NOT NULL REFERENCES zone (id) ON DELETE CASCADE,
        view TEXT NOT NULL,
        class TEXT NOT NULL,
        zone_type TEXT NOT NULL,
        serial INTEGER NOT NULL,
        loaded_at TEXT NOT NULL,
        url TEXT,
        fetch_id INTEGER NOT NULL,
        UNIQUE (daemon_id, view, zone_id)
    )",
    "CREATE INDEX IF NOT EXISTS local_zone_zone_id_idx ON local_zone (zone_id)",
    "CREATE TABLE IF NOT EXISTS zone_inventory_state (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        daemon_id INTEGER NOT NULL UNIQUE REFERENCES daemon (id) ON DELETE CASCADE,
        status TEXT NOT NULL CHECK (status IN ('ok', 'busy', 'uninitialized', 'erred')),
        error TEXT,
        zone_count INTEGER,
        created_at TEXT NOT NULL
    )",
];

/// Translate a `sqlx` error into a [`StoreError`], separating retryable lock and
/// uniqueness conflicts from everything else.
#[must_use]
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let retryable = db_err.is_unique_violation()
            || db_err
                .code()
                .is_some_and(|code| RETRYABLE_CODES.contains(&code.as_ref()));
        if retryable {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err.to_string())
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn decode_serial(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::InvalidData(format!("serial {value} out of range")))
}

fn daemon_from_row(row: &SqliteRow) -> Result<Daemon, StoreError> {
    let app_type: String = row.try_get("type").map_err(map_sqlx_error)?;
    Ok(Daemon {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        name: row.try_get("name").map_err(map_sqlx_error)?,
        app_id: row.try_get("app_id").map_err(map_sqlx_error)?,
        app_type: AppType::from_str(&app_type).map_err(StoreError::InvalidData)?,
        agent_address: row.try_get("agent_address").map_err(map_sqlx_error)?,
    })
}

fn local_zone_from_row(row: &SqliteRow) -> Result<LocalZone, StoreError> {
    Ok(LocalZone {
        daemon_id: row.try_get("daemon_id").map_err(map_sqlx_error)?,
        zone_id: row.try_get("zone_id").map_err(map_sqlx_error)?,
        zone_name: row.try_get("name").map_err(map_sqlx_error)?,
        view: row.try_get("view").map_err(map_sqlx_error)?,
        class: row.try_get("class").map_err(map_sqlx_error)?,
        zone_type: row.try_get("zone_type").map_err(map_sqlx_error)?,
        serial: decode_serial(row.try_get("serial").map_err(map_sqlx_error)?)?,
        loaded_at: row.try_get("loaded_at").map_err(map_sqlx_error)?,
        url: row.try_get("url").map_err(map_sqlx_error)?,
        fetch_id: row.try_get("fetch_id").map_err(map_sqlx_error)?,
    })
}

fn state_from_row(row: &SqliteRow) -> Result<ZoneInventoryState, StoreError> {
    let status: String = row.try_get("status").map_err(map_sqlx_error)?;
    Ok(ZoneInventoryState {
        daemon_id: row.try_get("daemon_id").map_err(map_sqlx_error)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        result: DaemonFetchResult {
            status: status.parse().map_err(StoreError::InvalidData)?,
            error: row.try_get("error").map_err(map_sqlx_error)?,
            zone_count: row.try_get("zone_count").map_err(map_sqlx_error)?,
        },
    })
}

/// Zone store backed by a SQLite database.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the database at `url`, e.g.
    /// `sqlite://zone-inventory.db`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the URL is invalid or the database
    /// cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(map_sqlx_error)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS));
        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        debug!(url = url, "Connected to zone inventory database");
        Ok(Self { pool })
    }

    /// Open a private in-memory database.
    ///
    /// The pool holds exactly one connection that is never recycled, since the
    /// database disappears with it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if SQLite cannot be initialized.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(map_sqlx_error)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist yet. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a statement fails.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        info!("Zone inventory schema initialized");
        Ok(())
    }

    /// Register an app and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn add_app(&self, app_type: AppType, agent_address: &str) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO app (type, agent_address) VALUES (?, ?) RETURNING id",
        )
        .bind(app_type.as_str())
        .bind(agent_address)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    /// Register a daemon of an existing app.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidData`] if the app does not exist.
    pub async fn add_daemon(&self, app_id: i64, name: &str) -> Result<Daemon, StoreError> {
        let app = sqlx::query("SELECT type, agent_address FROM app WHERE id = ?")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| StoreError::InvalidData(format!("app {app_id} does not exist")))?;
        let app_type: String = app.try_get("type").map_err(map_sqlx_error)?;
        let agent_address: String = app.try_get("agent_address").map_err(map_sqlx_error)?;

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO daemon (app_id, name) VALUES (?, ?) RETURNING id",
        )
        .bind(app_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Daemon {
            id,
            name: name.to_string(),
            app_id,
            app_type: AppType::from_str(&app_type).map_err(StoreError::InvalidData)?,
            agent_address,
        })
    }

    async fn ensure_daemon(&self, daemon_id: i64) -> Result<(), StoreError> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM daemon WHERE id = ?")
            .bind(daemon_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::DaemonNotFound(daemon_id)),
        }
    }
}

#[async_trait]
impl ZoneStore for SqliteStore {
    async fn list_dns_daemons(&self) -> Result<Vec<Daemon>, StoreError> {
        let rows = sqlx::query(
            "SELECT d.id, d.name, d.app_id, a.type, a.agent_address
             FROM daemon d JOIN app a ON a.id = d.app_id
             WHERE a.type IN ('bind9', 'pdns')
             ORDER BY d.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(daemon_from_row).collect()
    }

    async fn commit_zone_batch(
        &self,
        daemon_id: i64,
        fetch_id: i64,
        zones: &[ExtendedZone],
    ) -> Result<(), StoreError> {
        self.ensure_daemon(daemon_id).await?;
        if zones.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut zone_ids: HashMap<String, i64> = HashMap::new();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for zone in zones {
            let name = canonical_name(zone.name());
            let zone_id = match zone_ids.get(&name) {
                Some(id) => *id,
                None => {
                    let id = sqlx::query_scalar::<_, i64>(
                        "INSERT INTO zone (name, created_at) VALUES (?, ?)
                         ON CONFLICT (name) DO UPDATE SET name = excluded.name
                         RETURNING id",
                    )
                    .bind(&name)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
                    zone_ids.insert(name, id);
                    id
                }
            };

            sqlx::query(
                "INSERT INTO local_zone
                    (daemon_id, zone_id, view, class, zone_type, serial, loaded_at, url, fetch_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (daemon_id, view, zone_id) DO UPDATE SET
                    class = excluded.class,
                    zone_type = excluded.zone_type,
                    serial = excluded.serial,
                    loaded_at = excluded.loaded_at,
                    url = excluded.url,
                    fetch_id = excluded.fetch_id",
            )
            .bind(daemon_id)
            .bind(zone_id)
            .bind(zone.view())
            .bind(&zone.zone.class)
            .bind(&zone.zone.zone_type)
            .bind(i64::from(zone.zone.serial))
            .bind(zone.zone.loaded_at)
            .bind(zone.zone.url.as_deref())
            .bind(fetch_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn sweep_stale_local_zones(
        &self,
        daemon_id: i64,
        fetch_id: i64,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let removed = sqlx::query("DELETE FROM local_zone WHERE daemon_id = ? AND fetch_id <> ?")
            .bind(daemon_id)
            .bind(fetch_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        if removed > 0 {
            sqlx::query(
                "DELETE FROM zone
                 WHERE NOT EXISTS (SELECT 1 FROM local_zone WHERE local_zone.zone_id = zone.id)",
            )
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(removed)
    }

    async fn upsert_inventory_state(&self, state: &ZoneInventoryState) -> Result<(), StoreError> {
        self.ensure_daemon(state.daemon_id).await?;
        sqlx::query(
            "INSERT INTO zone_inventory_state (daemon_id, status, error, zone_count, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (daemon_id) DO UPDATE SET
                status = excluded.status,
                error = excluded.error,
                zone_count = excluded.zone_count,
                created_at = excluded.created_at",
        )
        .bind(state.daemon_id)
        .bind(state.status().as_str())
        .bind(state.result.error.as_deref())
        .bind(state.result.zone_count)
        .bind(state.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_inventory_states(&self) -> Result<Vec<ZoneInventoryState>, StoreError> {
        let rows = sqlx::query(
            "SELECT daemon_id, status, error, zone_count, created_at
             FROM zone_inventory_state ORDER BY daemon_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(state_from_row).collect()
    }

    async fn list_daemon_zones(&self, daemon_id: i64) -> Result<Vec<Zone>, StoreError> {
        let rows = sqlx::query(
            "SELECT lz.daemon_id, lz.zone_id, z.name, lz.view, lz.class, lz.zone_type,
                    lz.serial, lz.loaded_at, lz.url, lz.fetch_id
             FROM local_zone lz JOIN zone z ON z.id = lz.zone_id
             WHERE lz.daemon_id = ?",
        )
        .bind(daemon_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| local_zone_from_row(row).map(|local| local.to_zone()))
            .collect()
    }

    async fn list_local_zones(&self, zone_name: &str) -> Result<Vec<LocalZone>, StoreError> {
        let rows = sqlx::query(
            "SELECT lz.daemon_id, lz.zone_id, z.name, lz.view, lz.class, lz.zone_type,
                    lz.serial, lz.loaded_at, lz.url, lz.fetch_id
             FROM local_zone lz JOIN zone z ON z.id = lz.zone_id
             WHERE z.name = ?
             ORDER BY lz.daemon_id, lz.view",
        )
        .bind(canonical_name(zone_name))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(local_zone_from_row).collect()
    }

    async fn count_zones(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM zone")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(to_count(count))
    }

    async fn count_local_zones(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM local_zone")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(to_count(count))
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod sqlite_tests;
