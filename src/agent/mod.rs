// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone streams from remote DNS agents.
//!
//! An agent serves the zone catalog of one or more daemons as a lazy sequence:
//! zero or more zones, optionally followed by exactly one terminal error. The
//! transport is pluggable through [`ZoneStreamer`]; [`http::HttpZoneStreamer`]
//! speaks newline-delimited JSON over HTTP.
//!
//! [`AgentZoneStream`] wraps any transport with the fetch's cancellation token
//! and a soft per-stream timeout.

pub mod http;
pub mod wire;

pub use http::HttpZoneStreamer;

use crate::errors::AgentError;
use crate::zone::{Daemon, ExtendedZone, ZoneFilter};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Items produced by a zone stream. After an `Err` item the stream ends.
pub type ZoneStream = BoxStream<'static, Result<ExtendedZone, AgentError>>;

/// Capability to receive the zone catalog of a daemon from its agent.
pub trait ZoneStreamer: Send + Sync {
    /// Start receiving zones of `daemon`, optionally narrowed by `filter`.
    ///
    /// Nothing is sent until the stream is first polled. Every failure,
    /// including failing to connect, is reported as the terminal item.
    fn receive_zones(&self, daemon: &Daemon, filter: Option<&ZoneFilter>) -> ZoneStream;
}

/// A zone stream bounded by cancellation and a soft timeout.
///
/// - cancellation ends the stream with [`AgentError::cancelled`]
/// - waiting on the agent for longer than the timeout, summed over all
///   calls to [`Self::next`], ends it with [`AgentError::timeout`]
/// - after the first error or the end of the inner stream, [`Self::next`]
///   returns `None` forever
///
/// Time spent by the caller between two calls (storing zones, for example)
/// is not charged to the timeout.
pub struct AgentZoneStream {
    inner: ZoneStream,
    cancel: CancellationToken,
    remaining: Duration,
    finished: bool,
}

impl AgentZoneStream {
    /// Open a stream for `daemon` through `streamer`.
    ///
    /// # Arguments
    /// * `streamer` - Agent transport
    /// * `daemon` - Daemon whose zones are requested
    /// * `filter` - Optional view/lower bound/limit forwarded to the agent
    /// * `cancel` - Fetch cancellation token
    /// * `timeout` - Soft limit on the time spent waiting for the agent
    #[must_use]
    pub fn open(
        streamer: &dyn ZoneStreamer,
        daemon: &Daemon,
        filter: Option<&ZoneFilter>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self::from_stream(streamer.receive_zones(daemon, filter), cancel, timeout)
    }

    /// Wrap an existing stream.
    #[must_use]
    pub fn from_stream(inner: ZoneStream, cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            inner,
            cancel,
            remaining: timeout,
            finished: false,
        }
    }

    /// Receive the next zone.
    ///
    /// Returns `None` once the stream completed without error or after the
    /// terminal error has been returned.
    pub async fn next(&mut self) -> Option<Result<ExtendedZone, AgentError>> {
        if self.finished {
            return None;
        }
        let started = Instant::now();
        let item = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Some(Err(AgentError::cancelled())),
            () = tokio::time::sleep(self.remaining) => Some(Err(AgentError::timeout())),
            item = self.inner.next() => item,
        };
        self.remaining = self.remaining.saturating_sub(started.elapsed());
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}
