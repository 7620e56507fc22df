// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Batched upsert of zones received from one daemon.
//!
//! Zones are buffered until the batch reaches its target size and then written
//! in a single store transaction. Before writing, entries with the same
//! canonical name and view are coalesced: the last occurrence wins and the
//! others are counted as shadowed.
//!
//! A flush that loses a race with another daemon's transaction is retried on
//! the schedule of [`crate::retry::batch_backoff`]. A batch is either committed
//! as a whole or not at all; [`ZoneBatch::discard`] drops buffered zones without
//! writing them.

use crate::dns_name::canonical_name;
use crate::errors::BatchError;
use crate::metrics;
use crate::retry::retry_store_call;
use crate::store::ZoneStore;
use crate::zone::ExtendedZone;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drop all but the last occurrence of every `(name, view)`, keeping arrival
/// order among the survivors. Returns the survivors and the number dropped.
#[must_use]
pub fn coalesce(zones: Vec<ExtendedZone>) -> (Vec<ExtendedZone>, usize) {
    let total = zones.len();
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(total);
    let mut kept: Vec<ExtendedZone> = zones
        .into_iter()
        .rev()
        .filter(|zone| seen.insert((canonical_name(zone.name()), zone.view().to_string())))
        .collect();
    kept.reverse();
    let shadowed = total - kept.len();
    (kept, shadowed)
}

/// Buffer of zones from one daemon awaiting a transactional write.
pub struct ZoneBatch {
    store: Arc<dyn ZoneStore>,
    daemon_id: i64,
    fetch_id: i64,
    capacity: usize,
    pending: Vec<ExtendedZone>,
    committed: usize,
    shadowed: usize,
}

impl ZoneBatch {
    /// Create an empty batch.
    ///
    /// # Arguments
    /// * `store` - Store the batch is written to
    /// * `daemon_id` - Daemon all zones belong to
    /// * `fetch_id` - Fetch stamped on every written association
    /// * `capacity` - Number of buffered zones that triggers a flush (at least 1)
    #[must_use]
    pub fn new(store: Arc<dyn ZoneStore>, daemon_id: i64, fetch_id: i64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            daemon_id,
            fetch_id,
            capacity,
            pending: Vec::with_capacity(capacity),
            committed: 0,
            shadowed: 0,
        }
    }

    /// Buffer a zone, flushing the batch when it reaches its capacity.
    ///
    /// # Errors
    ///
    /// Returns the flush error, in which case the batch is empty afterwards.
    pub async fn add(
        &mut self,
        zone: ExtendedZone,
        cancel: &CancellationToken,
    ) -> Result<(), BatchError> {
        self.pending.push(zone);
        if self.len() >= self.capacity {
            self.flush(cancel).await?;
        }
        Ok(())
    }

    /// Write all buffered zones in one transaction.
    ///
    /// Does nothing when the batch is empty.
    ///
    /// # Errors
    ///
    /// - [`BatchError::Cancelled`] if `cancel` fires before the write commits
    /// - [`BatchError::Store`] if the store rejects the batch
    ///
    /// Either way the buffered zones are dropped and nothing was written.
    pub async fn flush(&mut self, cancel: &CancellationToken) -> Result<(), BatchError> {
        if self.is_empty() {
            return Ok(());
        }
        let (zones, shadowed) = coalesce(std::mem::take(&mut self.pending));
        if shadowed > 0 {
            warn!(
                daemon_id = self.daemon_id,
                shadowed = shadowed,
                "Agent reported the same zone more than once in a batch, keeping the last"
            );
        }

        let started = Instant::now();
        let store = &self.store;
        let (daemon_id, fetch_id) = (self.daemon_id, self.fetch_id);
        let batch = zones.as_slice();
        let operation = format!("zone batch of daemon {daemon_id}");
        retry_store_call(
            move || store.commit_zone_batch(daemon_id, fetch_id, batch),
            &operation,
            cancel,
        )
        .await?;
        metrics::record_batch_flush(started.elapsed());

        self.committed += zones.len();
        self.shadowed += shadowed;
        debug!(
            daemon_id = daemon_id,
            fetch_id = fetch_id,
            zones = zones.len(),
            elapsed = ?started.elapsed(),
            "Committed zone batch"
        );
        Ok(())
    }

    /// Drop buffered zones without writing them. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.len();
        self.pending.clear();
        dropped
    }

    /// Number of zones buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of zones written so far.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Number of zones dropped as duplicates in committed batches.
    #[must_use]
    pub fn shadowed(&self) -> usize {
        self.shadowed
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod batch_tests;
