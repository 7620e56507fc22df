// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Zone Inventory - DNS zone inventory for BIND 9 and PowerDNS fleets
//!
//! Zone inventory collects the zones served by every DNS daemon of a monitored
//! fleet, stores them in a shared database and serves them back in DNS order for
//! paging.
//!
//! ## Overview
//!
//! A fetch streams zones from the agent of each DNS daemon, bounded by a worker
//! limit, and commits them in batches. A zone served by many daemons is stored
//! once and associated with each daemon and view that serves it. Every daemon ends
//! a fetch with a recorded status (`ok`, `busy`, `uninitialized` or `erred`) and a
//! single notification reports the results of the whole fetch.
//!
//! ## Modules
//!
//! - [`manager`] - Starts fetches, reports progress, delivers notifications
//! - [`fetch`] - Bounded concurrent fetch across daemons
//! - [`batch`] - Batched, retried zone upserts
//! - [`agent`] - Agent zone streams and the HTTP transport
//! - [`store`] - Persistent store trait, SQLite and in-memory implementations
//! - [`zone_collection`] - Sorted zone collections with search and paging
//! - [`dns_name`] - DNS name ordering
//! - [`inventory_state`] - Per-daemon fetch outcomes
//! - [`config`] - Configuration loading
//!
//! ## Example
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
//! store.init_schema().await?;
//! let streamer = Arc::new(HttpZoneStreamer::new(Duration::from_secs(30))?);
//!
//! let manager = ZoneInventoryManager::new(store, streamer, Duration::from_secs(300));
//! let notification = manager.fetch_zones(4, 1000, true).await?.await?;
//! for (daemon_id, result) in &notification.results {
//!     println!("daemon {daemon_id}: {}", result.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod batch;
pub mod config;
pub mod constants;
pub mod dns_name;
pub mod errors;
pub mod fetch;
pub mod inventory_state;
pub mod manager;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod zone;
pub mod zone_collection;

#[cfg(test)]
mod test_utils;
