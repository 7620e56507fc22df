// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for store transactions and agent requests.
//!
//! This module provides utilities for retrying transient failures with exponential
//! backoff, while failing fast on permanent errors:
//!
//! - Store transactions that lost a race ([`StoreError::Conflict`]) are retried a
//!   fixed number of times on a short deterministic schedule.
//! - Agent HTTP requests answered with 429/5xx or failing to connect are retried
//!   with jitter until a time budget runs out.

use crate::constants::{
    BATCH_BACKOFF_MULTIPLIER, BATCH_INITIAL_BACKOFF_MILLIS, BATCH_MAX_RETRIES,
};
use crate::errors::{BatchError, StoreError};
use rand::Rng;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Agent retry initial interval (50ms)
const AGENT_INITIAL_INTERVAL_MILLIS: u64 = 50;

/// Agent retry maximum interval (10 seconds)
const AGENT_MAX_INTERVAL_SECS: u64 = 10;

/// Agent retry maximum elapsed time (2 minutes)
const AGENT_MAX_ELAPSED_TIME_SECS: u64 = 120;

/// Agent backoff multiplier (exponential growth factor)
const AGENT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with optional randomization (jitter). The
/// schedule ends when either the retry count or the elapsed time budget is
/// exhausted, whichever is configured and comes first.
#[derive(Debug)]
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Maximum number of intervals handed out
    pub max_retries: Option<u32>,
    /// Backoff multiplier (e.g. 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    retries: u32,
    start_time: Instant,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        max_retries: Option<u32>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            max_retries,
            multiplier,
            randomization_factor,
            retries: 0,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None once the schedule is exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }
        if let Some(max_retries) = self.max_retries {
            if self.retries >= max_retries {
                return None;
            }
        }
        self.retries += 1;

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let mut rng = rand::thread_rng();
        let jittered = rng.gen_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff for conflicting batch transactions.
///
/// # Retry Schedule
///
/// 1. 10ms
/// 2. 40ms
/// 3. 160ms
///
/// No jitter; the fourth failure is final.
#[must_use]
pub fn batch_backoff() -> ExponentialBackoff {
    let initial = Duration::from_millis(BATCH_INITIAL_BACKOFF_MILLIS);
    let max_interval = initial.mul_f64(BATCH_BACKOFF_MULTIPLIER.powi(2));
    ExponentialBackoff::new(
        initial,
        max_interval,
        None,
        Some(BATCH_MAX_RETRIES),
        BATCH_BACKOFF_MULTIPLIER,
        0.0,
    )
}

/// Backoff for opening agent zone streams.
///
/// # Configuration
///
/// - **Initial interval**: 50ms
/// - **Max interval**: 10 seconds
/// - **Max elapsed time**: 2 minutes total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn agent_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(AGENT_INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(AGENT_MAX_INTERVAL_SECS),
        Some(Duration::from_secs(AGENT_MAX_ELAPSED_TIME_SECS)),
        None,
        AGENT_BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Determine if an HTTP status code is retryable.
///
/// # Retryable Status Codes
///
/// - **429** (Too Many Requests) - Rate limiting
/// - **500** (Internal Server Error) - Server error
/// - **502** (Bad Gateway) - Proxy/gateway error
/// - **503** (Service Unavailable) - Temporary unavailability
/// - **504** (Gateway Timeout) - Gateway timeout
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Run a store transaction, retrying it on [`StoreError::Conflict`].
///
/// The operation must be safe to repeat: a failed attempt must have rolled back.
/// Cancellation is checked before every attempt and while waiting between
/// attempts, never in the middle of one.
///
/// # Errors
///
/// - [`BatchError::Cancelled`] if `cancel` fired before the operation succeeded
/// - [`BatchError::Store`] with the last error if it was not retryable or the
///   schedule was exhausted
pub async fn retry_store_call<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
    cancel: &CancellationToken,
) -> Result<T, BatchError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut backoff = batch_backoff();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Store transaction succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                error!(
                    operation = operation_name,
                    error = %e,
                    "Non-retryable store error, failing immediately"
                );
                return Err(BatchError::Store {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                let Some(duration) = backoff.next_backoff() else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %e,
                        "Store retries exhausted, giving up"
                    );
                    return Err(BatchError::Store {
                        attempts: attempt,
                        source: e,
                    });
                };

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    retry_after = ?duration,
                    error = %e,
                    "Store transaction conflict, will retry"
                );
                crate::metrics::record_batch_retry();

                tokio::select! {
                    () = cancel.cancelled() => return Err(BatchError::Cancelled),
                    () = tokio::time::sleep(duration) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
