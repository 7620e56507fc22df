// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Test fixtures shared by unit tests.

use crate::agent::{ZoneStream, ZoneStreamer};
use crate::errors::AgentError;
use crate::zone::{Daemon, ExtendedZone, Zone, ZoneFilter};
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed load time so zones compare equal across store round trips.
pub fn loaded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn zone(name: &str, view: &str, serial: u32) -> Zone {
    Zone {
        name: name.to_string(),
        class: "IN".to_string(),
        serial,
        zone_type: "primary".to_string(),
        loaded_at: loaded_at(),
        view: Some(view.to_string()),
        url: None,
    }
}

pub fn extended_zone(daemon_id: i64, name: &str, view: &str, serial: u32) -> ExtendedZone {
    ExtendedZone {
        zone: zone(name, view, serial),
        daemon_id,
        total_zone_count: 0,
    }
}

/// `count` zones named `zone-00000.<suffix>`, `zone-00001.<suffix>`, ...
pub fn numbered_zones(count: usize, suffix: &str, view: &str) -> Vec<Zone> {
    (0..count)
        .map(|i| zone(&format!("zone-{i:05}.{suffix}"), view, 1))
        .collect()
}

#[derive(Clone, Debug)]
struct Script {
    zones: Vec<Zone>,
    error: Option<AgentError>,
    hang: bool,
}

/// Decrements the active stream counter when the stream is dropped.
struct ActiveStream(Arc<AtomicUsize>);

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`ZoneStreamer`] replaying a fixed script per daemon.
///
/// Daemons without a script report no zones.
#[derive(Default)]
pub struct ScriptedStreamer {
    scripts: Mutex<HashMap<i64, Script>>,
    item_delay: Option<Duration>,
    opened: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every item, so concurrent streams overlap.
    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = Some(delay);
        self
    }

    fn script(&self, daemon_id: i64, zones: Vec<Zone>, error: Option<AgentError>, hang: bool) {
        self.scripts
            .lock()
            .unwrap()
            .insert(daemon_id, Script { zones, error, hang });
    }

    /// Stream `zones`, then end successfully.
    pub fn zones(&self, daemon_id: i64, zones: Vec<Zone>) {
        self.script(daemon_id, zones, None, false);
    }

    /// Stream `zones`, then end with `error`.
    pub fn fail(&self, daemon_id: i64, zones: Vec<Zone>, error: AgentError) {
        self.script(daemon_id, zones, Some(error), false);
    }

    /// Stream `zones`, then never produce another item.
    pub fn hang(&self, daemon_id: i64, zones: Vec<Zone>) {
        self.script(daemon_id, zones, None, true);
    }

    /// Number of streams opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Highest number of streams open at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl ZoneStreamer for ScriptedStreamer {
    fn receive_zones(&self, daemon: &Daemon, _filter: Option<&ZoneFilter>) -> ZoneStream {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let guard = ActiveStream(self.active.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&daemon.id)
            .cloned()
            .unwrap_or(Script {
                zones: Vec::new(),
                error: None,
                hang: false,
            });

        let total = script.zones.len() as i64;
        let daemon_id = daemon.id;
        let mut items: Vec<Result<ExtendedZone, AgentError>> = script
            .zones
            .into_iter()
            .map(|zone| {
                Ok(ExtendedZone {
                    zone,
                    daemon_id,
                    total_zone_count: total,
                })
            })
            .collect();
        if let Some(error) = script.error {
            items.push(Err(error));
        }

        let delay = self.item_delay;
        let items = stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });
        let tail = if script.hang {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };
        items
            .chain(tail)
            .map(move |item| {
                let _active = &guard;
                item
            })
            .boxed()
    }
}
