// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the zone inventory.
//!
//! This module records metrics with the namespace prefix `zone_inventory_`.
//! Metrics live in a crate registry and can be rendered in the Prometheus text
//! format with [`gather_metrics`]; serving them is left to the embedding
//! application.
//!
//! # Metrics Categories
//!
//! - **Fetch Metrics** - Fetches started and completed, fetch duration, fetch in progress
//! - **Daemon Metrics** - Per-daemon fetch outcomes by status
//! - **Store Metrics** - Zones received, batch flush duration, batch retries
//!
//! # Example
//!
//! ```rust,no_run
//! use zone_inventory::metrics::{gather_metrics, record_fetch_started};
//!
//! record_fetch_started();
//! println!("{}", gather_metrics().unwrap());
//! ```

use crate::inventory_state::InventoryStatus;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all zone inventory metrics
const METRICS_NAMESPACE: &str = "zone_inventory";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Crate metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Fetch Metrics
// ============================================================================

/// Total number of fetches by phase
///
/// Labels:
/// - `phase`: `started` or `completed`
pub static FETCHES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_fetches_total"),
        "Total number of zone fetches by phase",
    );
    let counter = CounterVec::new(opts, &["phase"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of complete fetches in seconds
pub static FETCH_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_fetch_duration_seconds"),
        "Duration of zone fetches across all daemons in seconds",
    )
    .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// 1 while a fetch is running, 0 otherwise
pub static FETCH_IN_PROGRESS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_fetch_in_progress"),
        "Whether a zone fetch is currently running",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Daemon Metrics
// ============================================================================

/// Total number of per-daemon fetch results by status
///
/// Labels:
/// - `status`: `ok`, `busy`, `uninitialized`, `erred`
pub static DAEMON_RESULTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_daemon_results_total"),
        "Total number of per-daemon zone fetch results by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Store Metrics
// ============================================================================

/// Total number of zones received from agents
pub static ZONES_RECEIVED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_zones_received_total"),
        "Total number of zones received from agents",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of committed batch transactions in seconds
pub static BATCH_FLUSH_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_batch_flush_duration_seconds"),
        "Duration of zone batch transactions in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of batch transactions retried after a conflict
pub static BATCH_RETRIES_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_batch_retries_total"),
        "Total number of zone batch transactions retried after a conflict",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record the start of a fetch
pub fn record_fetch_started() {
    FETCHES_TOTAL.with_label_values(&["started"]).inc();
    FETCH_IN_PROGRESS.set(1.0);
}

/// Record the completion of a fetch
///
/// # Arguments
/// * `duration` - Time from start to notification
pub fn record_fetch_completed(duration: Duration) {
    FETCHES_TOTAL.with_label_values(&["completed"]).inc();
    FETCH_DURATION_SECONDS.observe(duration.as_secs_f64());
    FETCH_IN_PROGRESS.set(0.0);
}

/// Record the outcome of fetching from one daemon
pub fn record_daemon_result(status: InventoryStatus) {
    DAEMON_RESULTS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
}

/// Record zones received from an agent
pub fn record_zones_received(count: usize) {
    ZONES_RECEIVED_TOTAL.inc_by(count as f64);
}

/// Record a committed batch transaction
pub fn record_batch_flush(duration: Duration) {
    BATCH_FLUSH_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a retried batch transaction
pub fn record_batch_retry() {
    BATCH_RETRIES_TOTAL.inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
