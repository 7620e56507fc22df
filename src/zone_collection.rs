// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sorted, immutable collection of zones.
//!
//! A [`ZoneCollection`] holds the zones of one daemon snapshot in DNS order
//! (see [`crate::dns_name`]). The input is sorted exactly once, when the
//! collection is built; every reader afterwards observes a strictly sorted
//! sequence without duplicate names. A new snapshot replaces the collection
//! rather than mutating it.
//!
//! # Lookups
//!
//! [`ZoneCollection::get`] picks its search strategy per call: a linear scan
//! for collections smaller than [`LINEAR_SEARCH_THRESHOLD`] zones, binary search
//! otherwise.
//!
//! # Paging
//!
//! [`ZoneCollection::page`] takes the name of the last zone of the previous page
//! as a cursor and returns the zones ordered strictly after it.
//!
//! ```rust
//! use chrono::Utc;
//! use zone_inventory::zone::Zone;
//! use zone_inventory::zone_collection::ZoneCollection;
//!
//! let zone = |name: &str| Zone {
//!     name: name.to_string(),
//!     class: "IN".to_string(),
//!     serial: 1,
//!     zone_type: "primary".to_string(),
//!     loaded_at: Utc::now(),
//!     view: None,
//!     url: None,
//! };
//! let zones = ZoneCollection::of(vec![zone("example.org"), zone("example.com")]);
//! let page: Vec<&str> = zones.page(None, 10).iter().map(|z| z.name.as_str()).collect();
//! assert_eq!(page, vec!["example.com", "example.org"]);
//! ```

use crate::constants::LINEAR_SEARCH_THRESHOLD;
use crate::dns_name::compare_names;
use crate::zone::Zone;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::sync::Arc;

/// Immutable, DNS-ordered sequence of zones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneCollection {
    zones: Vec<Arc<Zone>>,
}

impl ZoneCollection {
    /// Build a collection from zones in any order.
    ///
    /// When a name occurs more than once the last occurrence wins.
    #[must_use]
    pub fn of<I>(zones: I) -> Self
    where
        I: IntoIterator<Item = Zone>,
    {
        Self::from_shared(zones.into_iter().map(Arc::new))
    }

    /// Build a collection from shared zones in any order.
    #[must_use]
    pub fn from_shared<I>(zones: I) -> Self
    where
        I: IntoIterator<Item = Arc<Zone>>,
    {
        let mut zones: Vec<Arc<Zone>> = zones.into_iter().collect();
        // Stable sort keeps duplicates in input order, so the last of a run is the
        // last occurrence in the input.
        zones.sort_by(|a, b| compare_names(&a.name, &b.name));

        let mut deduplicated: Vec<Arc<Zone>> = Vec::with_capacity(zones.len());
        for zone in zones {
            match deduplicated.last_mut() {
                Some(last) if compare_names(&last.name, &zone.name) == Ordering::Equal => {
                    *last = zone;
                }
                _ => deduplicated.push(zone),
            }
        }

        Self {
            zones: deduplicated,
        }
    }

    /// Number of zones in the collection.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.zones.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zone names in DNS order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.zones.iter().map(|zone| zone.name.as_str())
    }

    /// Zones in DNS order. Each call starts a fresh iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Zone> + '_ {
        self.zones.iter().map(|zone| &**zone)
    }

    /// Shared handles to the zones in DNS order.
    #[must_use]
    pub fn as_slice(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    /// Find a zone by name (case-insensitive, trailing dot ignored).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Zone> {
        if self.zones.len() < LINEAR_SEARCH_THRESHOLD {
            self.get_linear(name)
        } else {
            self.get_binary(name)
        }
    }

    pub(crate) fn get_linear(&self, name: &str) -> Option<&Zone> {
        self.iter()
            .find(|zone| compare_names(&zone.name, name) == Ordering::Equal)
    }

    pub(crate) fn get_binary(&self, name: &str) -> Option<&Zone> {
        self.zones
            .binary_search_by(|zone| compare_names(&zone.name, name))
            .ok()
            .map(|index| &*self.zones[index])
    }

    /// Return up to `limit` zones ordered strictly after `lower_bound`.
    ///
    /// A missing or empty lower bound starts from the first zone. The bound does
    /// not have to name a zone in the collection; the page then begins at the
    /// first zone ordered after it.
    #[must_use]
    pub fn page(&self, lower_bound: Option<&str>, limit: usize) -> &[Arc<Zone>] {
        let start = match lower_bound {
            Some(bound) if !bound.is_empty() => self
                .zones
                .partition_point(|zone| compare_names(&zone.name, bound) != Ordering::Greater),
            _ => 0,
        };
        let end = start.saturating_add(limit).min(self.zones.len());
        &self.zones[start..end]
    }
}

impl<'a> IntoIterator for &'a ZoneCollection {
    type Item = &'a Arc<Zone>;
    type IntoIter = std::slice::Iter<'a, Arc<Zone>>;

    fn into_iter(self) -> Self::IntoIter {
        self.zones.iter()
    }
}

impl FromIterator<Zone> for ZoneCollection {
    fn from_iter<T: IntoIterator<Item = Zone>>(iter: T) -> Self {
        Self::of(iter)
    }
}

/// Serialized as a JSON array of zones in DNS order.
impl Serialize for ZoneCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ZoneCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Zone>::deserialize(deserializer).map(Self::of)
    }
}

#[cfg(test)]
#[path = "zone_collection_tests.rs"]
mod zone_collection_tests;
