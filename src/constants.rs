// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the zone inventory.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Fetch Constants
// ============================================================================

/// Default number of daemons fetched from concurrently
pub const DEFAULT_FETCH_PARALLELISM: usize = 4;

/// Default number of zones committed to the store in one transaction
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 1000;

/// Default soft timeout for a single agent zone stream (5 minutes)
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;

/// Default timeout for opening the HTTP request to an agent
pub const DEFAULT_AGENT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Error message recorded for daemons whose fetch was cancelled
pub const FETCH_CANCELLED_MESSAGE: &str = "cancelled";

/// Error message recorded for daemons whose stream exceeded its soft timeout
pub const FETCH_TIMEOUT_MESSAGE: &str = "timeout";

// ============================================================================
// Zone Collection Constants
// ============================================================================

/// Collection size at which lookups switch from a linear scan to binary search.
///
/// Linear scans win below roughly three thousand zones because they avoid the
/// label splitting overhead of repeated comparisons at random positions.
pub const LINEAR_SEARCH_THRESHOLD: usize = 3000;

/// View name assigned to zones whose agent does not report one
pub const DEFAULT_VIEW: &str = "_default";

// ============================================================================
// Batch Upsert Constants
// ============================================================================

/// Number of times a conflicting batch transaction is retried
pub const BATCH_MAX_RETRIES: u32 = 3;

/// Delay before the first batch retry (10ms)
pub const BATCH_INITIAL_BACKOFF_MILLIS: u64 = 10;

/// Growth factor between batch retries (10ms, 40ms, 160ms)
pub const BATCH_BACKOFF_MULTIPLIER: f64 = 4.0;

// ============================================================================
// Agent API Constants
// ============================================================================

/// Path of the zone streaming endpoint on an agent
pub const AGENT_ZONES_PATH: &str = "zones";

// ============================================================================
// Configuration Environment Variables
// ============================================================================

/// Overrides `database_url`
pub const ENV_DATABASE_URL: &str = "ZONE_INVENTORY_DATABASE_URL";

/// Overrides `parallelism`
pub const ENV_PARALLELISM: &str = "ZONE_INVENTORY_PARALLELISM";

/// Overrides `batch_size`
pub const ENV_BATCH_SIZE: &str = "ZONE_INVENTORY_BATCH_SIZE";

/// Overrides `stream_timeout_secs`
pub const ENV_STREAM_TIMEOUT_SECS: &str = "ZONE_INVENTORY_STREAM_TIMEOUT_SECS";

/// Overrides `agent_request_timeout_secs`
pub const ENV_AGENT_REQUEST_TIMEOUT_SECS: &str = "ZONE_INVENTORY_AGENT_REQUEST_TIMEOUT_SECS";

/// Default SQLite database location
pub const DEFAULT_DATABASE_URL: &str = "sqlite://zone-inventory.db";
