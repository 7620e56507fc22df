// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control plane of the zone inventory.
//!
//! [`ZoneInventoryManager`] starts fetches, reports their progress and
//! delivers one [`FetchNotification`] per fetch. At most one fetch runs at a
//! time; a second request while one is running is rejected with
//! [`ManagerError::AlreadyFetching`] and changes nothing.
//!
//! A single mutex guards the active session and the progress counters. It is
//! only held for short, non-suspending sections.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use zone_inventory::agent::HttpZoneStreamer;
//! use zone_inventory::manager::ZoneInventoryManager;
//! use zone_inventory::store::SqliteStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(SqliteStore::connect("sqlite://zone-inventory.db").await?);
//! let streamer = Arc::new(HttpZoneStreamer::new(Duration::from_secs(30))?);
//! let manager = ZoneInventoryManager::new(store, streamer, Duration::from_secs(300));
//!
//! let notification = manager.fetch_zones(4, 1000, true).await?;
//! let results = notification.await?;
//! println!("{} daemons fetched", results.results.len());
//! # Ok(())
//! # }
//! ```

use crate::agent::ZoneStreamer;
use crate::errors::{ManagerError, StoreError};
use crate::fetch::{last_fetch_succeeded, FetchObserver, FetchOptions, FetchPipeline};
use crate::inventory_state::DaemonFetchResult;
use crate::metrics;
use crate::store::ZoneStore;
use crate::zone::Daemon;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome of a complete fetch, keyed by daemon id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchNotification {
    pub results: BTreeMap<i64, DaemonFetchResult>,
}

/// Snapshot of fetch progress.
///
/// While no fetch runs, the counters of the last fetch are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchProgress {
    pub in_progress: bool,
    pub apps_total: u32,
    pub completed_apps: u32,
}

struct FetchSession {
    cancel: CancellationToken,
    apps_total: u32,
    completed_apps: u32,
    results: BTreeMap<i64, DaemonFetchResult>,
}

#[derive(Default)]
struct ManagerState {
    session: Option<FetchSession>,
    last_apps_total: u32,
    last_completed_apps: u32,
    last_fetch_id: i64,
}

impl ManagerState {
    /// End the session, keeping its counters for progress queries.
    fn finish_session(&mut self) -> Option<FetchSession> {
        let session = self.session.take()?;
        self.last_apps_total = session.apps_total;
        self.last_completed_apps = session.completed_apps;
        Some(session)
    }

    /// Fetch ids only need to differ between fetches; time keeps them distinct
    /// across restarts.
    fn next_fetch_id(&mut self) -> i64 {
        self.last_fetch_id = Utc::now().timestamp_micros().max(self.last_fetch_id + 1);
        self.last_fetch_id
    }
}

type SharedState = Arc<Mutex<ManagerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ManagerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes worker results into the active session.
struct SessionObserver {
    state: SharedState,
}

impl FetchObserver for SessionObserver {
    fn daemon_completed(&self, daemon_id: i64, result: DaemonFetchResult) {
        let mut state = lock(&self.state);
        if let Some(session) = state.session.as_mut() {
            session.results.insert(daemon_id, result);
            session.completed_apps += 1;
        }
    }
}

/// Starts zone fetches and tracks the active one.
pub struct ZoneInventoryManager {
    store: Arc<dyn ZoneStore>,
    pipeline: FetchPipeline,
    state: SharedState,
}

impl ZoneInventoryManager {
    /// Create a manager.
    ///
    /// # Arguments
    /// * `store` - Store holding daemons, zones and inventory states
    /// * `streamer` - Agent transport
    /// * `stream_timeout` - Soft limit for receiving the zones of one daemon
    #[must_use]
    pub fn new(
        store: Arc<dyn ZoneStore>,
        streamer: Arc<dyn ZoneStreamer>,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            pipeline: FetchPipeline::new(store.clone(), streamer, stream_timeout),
            store,
            state: SharedState::default(),
        }
    }

    /// Start fetching zones from all DNS daemons in the background.
    ///
    /// # Arguments
    /// * `parallelism` - Maximum number of daemons fetched concurrently (> 0)
    /// * `batch_size` - Number of zones per store transaction (> 0)
    /// * `force` - Fetch from every daemon; when `false`, daemons whose last
    ///   fetch succeeded are skipped
    ///
    /// # Returns
    ///
    /// A receiver that yields exactly one [`FetchNotification`] once every
    /// daemon has a result. When there is nothing to fetch, the notification
    /// is already available.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::InvalidParameter`] for a zero parameter
    /// - [`ManagerError::AlreadyFetching`] while another fetch runs
    /// - [`ManagerError::Store`] if the daemons cannot be listed
    ///
    /// No fetch is started in any of these cases.
    pub async fn fetch_zones(
        &self,
        parallelism: usize,
        batch_size: usize,
        force: bool,
    ) -> Result<oneshot::Receiver<FetchNotification>, ManagerError> {
        validate_parameter("parallelism", parallelism)?;
        validate_parameter("batch_size", batch_size)?;

        let (cancel, fetch_id) = {
            let mut state = lock(&self.state);
            if state.session.is_some() {
                return Err(ManagerError::AlreadyFetching);
            }
            let cancel = CancellationToken::new();
            state.session = Some(FetchSession {
                cancel: cancel.clone(),
                apps_total: 0,
                completed_apps: 0,
                results: BTreeMap::new(),
            });
            (cancel, state.next_fetch_id())
        };

        let daemons = match self.select_daemons(force).await {
            Ok(daemons) => daemons,
            Err(e) => {
                lock(&self.state).session = None;
                return Err(e.into());
            }
        };

        let apps_total = u32::try_from(daemons.len()).unwrap_or(u32::MAX);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = lock(&self.state);
            if let Some(session) = state.session.as_mut() {
                session.apps_total = apps_total;
            }
            if daemons.is_empty() {
                state.finish_session();
                drop(state);
                info!(force = force, "No DNS daemons to fetch zones from");
                let _ = tx.send(FetchNotification::default());
                return Ok(rx);
            }
        }

        info!(
            fetch_id = fetch_id,
            apps_total = apps_total,
            parallelism = parallelism,
            batch_size = batch_size,
            force = force,
            "Zone fetch started"
        );
        metrics::record_fetch_started();

        let pipeline = self.pipeline.clone();
        let state = self.state.clone();
        let options = FetchOptions {
            fetch_id,
            parallelism,
            batch_size,
        };
        tokio::spawn(async move {
            let started = Instant::now();
            let observer = Arc::new(SessionObserver {
                state: state.clone(),
            });
            pipeline.run(daemons, options, cancel, observer).await;

            let results = lock(&state)
                .finish_session()
                .map(|session| session.results)
                .unwrap_or_default();
            metrics::record_fetch_completed(started.elapsed());
            info!(
                fetch_id = fetch_id,
                daemons = results.len(),
                elapsed = ?started.elapsed(),
                "Zone fetch completed"
            );
            if tx.send(FetchNotification { results }).is_err() {
                debug!(fetch_id = fetch_id, "Zone fetch notification was not awaited");
            }
        });

        Ok(rx)
    }

    async fn select_daemons(&self, force: bool) -> Result<Vec<Daemon>, StoreError> {
        let daemons = self.store.list_dns_daemons().await?;
        if force {
            return Ok(daemons);
        }
        let states = self.store.list_inventory_states().await?;
        Ok(daemons
            .into_iter()
            .filter(|daemon| !last_fetch_succeeded(&states, daemon.id))
            .collect())
    }

    /// Progress of the running fetch, or the final counters of the last one.
    #[must_use]
    pub fn fetch_zones_progress(&self) -> FetchProgress {
        let state = lock(&self.state);
        match &state.session {
            Some(session) => FetchProgress {
                in_progress: true,
                apps_total: session.apps_total,
                completed_apps: session.completed_apps,
            },
            None => FetchProgress {
                in_progress: false,
                apps_total: state.last_apps_total,
                completed_apps: state.last_completed_apps,
            },
        }
    }

    /// Cancel the running fetch. Returns `false` if no fetch was running.
    ///
    /// The notification is still delivered, with `cancelled` results for
    /// daemons that had not finished.
    pub fn cancel_fetch(&self) -> bool {
        let state = lock(&self.state);
        match &state.session {
            Some(session) => {
                info!("Cancelling zone fetch");
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        lock(&self.state).session.is_some()
    }
}

fn validate_parameter(name: &'static str, value: usize) -> Result<(), ManagerError> {
    if value == 0 {
        return Err(ManagerError::InvalidParameter {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
