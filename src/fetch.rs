// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Concurrent zone fetch across DNS daemons.
//!
//! One worker task is spawned per daemon and a semaphore bounds how many of them
//! talk to agents at the same time. Each worker:
//!
//! 1. opens an [`AgentZoneStream`] for its daemon
//! 2. buffers received zones in a [`ZoneBatch`], flushing whenever it fills up
//! 3. on success, flushes the rest, sweeps associations not seen in this fetch
//!    and records `ok` with the reported zone count
//! 4. on a terminal stream error, discards the buffered zones and records the
//!    matching status
//! 5. writes the daemon's [`ZoneInventoryState`] and reports the result to the
//!    [`FetchObserver`]
//!
//! Workers never fail each other. A worker that has not started when the fetch
//! is cancelled records the cancellation without contacting its agent.

use crate::agent::{AgentZoneStream, ZoneStreamer};
use crate::batch::ZoneBatch;
use crate::errors::{BatchError, StoreError};
use crate::inventory_state::{DaemonFetchResult, InventoryStatus, ZoneInventoryState};
use crate::metrics;
use crate::store::ZoneStore;
use crate::zone::Daemon;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receives per-daemon results as workers finish.
///
/// Called exactly once per daemon of a fetch, from the worker's task.
pub trait FetchObserver: Send + Sync {
    fn daemon_completed(&self, daemon_id: i64, result: DaemonFetchResult);
}

/// Collects results into a map.
impl FetchObserver for Mutex<BTreeMap<i64, DaemonFetchResult>> {
    fn daemon_completed(&self, daemon_id: i64, result: DaemonFetchResult) {
        match self.lock() {
            Ok(mut results) => {
                results.insert(daemon_id, result);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(daemon_id, result);
            }
        }
    }
}

/// Parameters of one fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Id stamped on every association written by this fetch
    pub fetch_id: i64,
    /// Maximum number of daemons fetched concurrently
    pub parallelism: usize,
    /// Number of zones per store transaction
    pub batch_size: usize,
}

/// Runs fetches against a store with a given agent transport.
#[derive(Clone)]
pub struct FetchPipeline {
    store: Arc<dyn ZoneStore>,
    streamer: Arc<dyn ZoneStreamer>,
    stream_timeout: Duration,
}

struct WorkerContext {
    store: Arc<dyn ZoneStore>,
    streamer: Arc<dyn ZoneStreamer>,
    observer: Arc<dyn FetchObserver>,
    cancel: CancellationToken,
    stream_timeout: Duration,
    options: FetchOptions,
}

impl FetchPipeline {
    /// Create a pipeline.
    ///
    /// # Arguments
    /// * `store` - Store receiving zones and inventory states
    /// * `streamer` - Agent transport
    /// * `stream_timeout` - Soft limit for receiving the zones of one daemon
    #[must_use]
    pub fn new(
        store: Arc<dyn ZoneStore>,
        streamer: Arc<dyn ZoneStreamer>,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            store,
            streamer,
            stream_timeout,
        }
    }

    /// Fetch zones from every daemon in `daemons` and wait for all workers.
    ///
    /// Results are reported through `observer` as they become available; when
    /// this returns, every daemon has been reported exactly once.
    pub async fn run(
        &self,
        daemons: Vec<Daemon>,
        options: FetchOptions,
        cancel: CancellationToken,
        observer: Arc<dyn FetchObserver>,
    ) {
        if daemons.is_empty() {
            return;
        }
        let workers = options.parallelism.clamp(1, daemons.len());
        info!(
            fetch_id = options.fetch_id,
            daemons = daemons.len(),
            workers = workers,
            batch_size = options.batch_size,
            "Starting zone fetch"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let ctx = Arc::new(WorkerContext {
            store: self.store.clone(),
            streamer: self.streamer.clone(),
            observer,
            cancel,
            stream_timeout: self.stream_timeout,
            options,
        });

        let handles: Vec<(i64, JoinHandle<()>)> = daemons
            .into_iter()
            .map(|daemon| {
                let ctx = ctx.clone();
                let semaphore = semaphore.clone();
                let daemon_id = daemon.id;
                let handle = tokio::spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) if !ctx.cancel.is_cancelled() => {
                            fetch_daemon(&ctx, &daemon).await
                        }
                        Ok(_) => DaemonFetchResult::cancelled(),
                        Err(e) => DaemonFetchResult::erred(format!("Worker pool closed: {e}")),
                    };
                    complete_daemon(&ctx, daemon.id, result).await;
                });
                (daemon_id, handle)
            })
            .collect();

        for (daemon_id, handle) in handles {
            if let Err(e) = handle.await {
                error!(daemon_id = daemon_id, error = %e, "Zone fetch worker failed");
                complete_daemon(
                    &ctx,
                    daemon_id,
                    DaemonFetchResult::erred(format!("Zone fetch worker failed: {e}")),
                )
                .await;
            }
        }
        info!(fetch_id = options.fetch_id, "Zone fetch finished");
    }
}

/// Persist the daemon's state and report its result.
async fn complete_daemon(ctx: &WorkerContext, daemon_id: i64, result: DaemonFetchResult) {
    metrics::record_daemon_result(result.status);
    let state = ZoneInventoryState::new(daemon_id, result.clone());
    if let Err(e) = ctx.store.upsert_inventory_state(&state).await {
        error!(
            daemon_id = daemon_id,
            status = %result.status,
            error = %e,
            "Failed to store zone inventory state"
        );
    }
    ctx.observer.daemon_completed(daemon_id, result);
}

/// Receive and store the zones of one daemon.
async fn fetch_daemon(ctx: &WorkerContext, daemon: &Daemon) -> DaemonFetchResult {
    debug!(
        daemon_id = daemon.id,
        daemon = %daemon.name,
        agent = %daemon.agent_address,
        "Fetching zones from daemon"
    );
    let mut stream = AgentZoneStream::open(
        ctx.streamer.as_ref(),
        daemon,
        None,
        ctx.cancel.clone(),
        ctx.stream_timeout,
    );
    let mut batch = ZoneBatch::new(
        ctx.store.clone(),
        daemon.id,
        ctx.options.fetch_id,
        ctx.options.batch_size,
    );
    let mut received: usize = 0;
    let mut reported_total: Option<i64> = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(zone) => {
                received += 1;
                reported_total = Some(zone.total_zone_count);
                if let Err(e) = batch.add(zone, &ctx.cancel).await {
                    metrics::record_zones_received(received);
                    return batch_failure(daemon, &e);
                }
            }
            Err(e) => {
                let dropped = batch.discard();
                metrics::record_zones_received(received);
                warn!(
                    daemon_id = daemon.id,
                    agent = %daemon.agent_address,
                    received = received,
                    discarded = dropped,
                    error = %e,
                    "Zone stream ended with an error"
                );
                return DaemonFetchResult::from_agent_error(&e);
            }
        }
    }
    drop(stream);
    metrics::record_zones_received(received);

    if let Err(e) = batch.flush(&ctx.cancel).await {
        return batch_failure(daemon, &e);
    }
    match ctx
        .store
        .sweep_stale_local_zones(daemon.id, ctx.options.fetch_id)
        .await
    {
        Ok(removed) if removed > 0 => {
            info!(
                daemon_id = daemon.id,
                removed = removed,
                "Removed zones no longer served by daemon"
            );
        }
        Ok(_) => {}
        Err(e) => return sweep_failure(daemon, &e),
    }

    let zone_count = reported_total.unwrap_or(0);
    info!(
        daemon_id = daemon.id,
        received = received,
        stored = batch.committed(),
        shadowed = batch.shadowed(),
        zone_count = zone_count,
        "Fetched zones from daemon"
    );
    DaemonFetchResult::ok(zone_count)
}

fn batch_failure(daemon: &Daemon, err: &BatchError) -> DaemonFetchResult {
    match err {
        BatchError::Cancelled => {
            debug!(daemon_id = daemon.id, "Zone batch abandoned, fetch cancelled");
            DaemonFetchResult::cancelled()
        }
        BatchError::Store { .. } => {
            error!(daemon_id = daemon.id, error = %err, "Failed to store zones");
            DaemonFetchResult::erred(err.to_string())
        }
    }
}

fn sweep_failure(daemon: &Daemon, err: &StoreError) -> DaemonFetchResult {
    error!(daemon_id = daemon.id, error = %err, "Failed to remove stale zones");
    DaemonFetchResult::erred(format!("Failed to remove stale zones: {err}"))
}

/// Whether the daemon's last recorded fetch succeeded.
#[must_use]
pub fn last_fetch_succeeded(states: &[ZoneInventoryState], daemon_id: i64) -> bool {
    states
        .iter()
        .any(|state| state.daemon_id == daemon_id && state.status() == InventoryStatus::Ok)
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod fetch_tests;
