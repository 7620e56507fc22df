// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP transport for agent zone streams.
//!
//! The catalog of a daemon is requested with
//!
//! ```text
//! GET {agent}/zones?daemon=<name>[&view=<view>][&lower_bound=<name>][&limit=<n>]
//! ```
//!
//! and returned as newline-delimited [`WireMessage`](super::wire::WireMessage)s.
//! Opening the request is retried on 429/5xx responses and connection errors
//! with [`agent_backoff`]; once the body is streaming, any failure ends the
//! stream.

use super::wire::decode_line;
use super::{ZoneStream, ZoneStreamer};
use crate::constants::AGENT_ZONES_PATH;
use crate::errors::AgentError;
use crate::retry::{agent_backoff, is_retryable_http_status};
use crate::zone::{Daemon, ExtendedZone, ZoneFilter};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

type BodyStream = BoxStream<'static, reqwest::Result<Vec<u8>>>;

/// Build the base URL of an agent API.
///
/// Addresses without a scheme get `http://`; trailing slashes are removed.
#[must_use]
pub fn build_agent_url(agent_address: &str) -> String {
    if agent_address.starts_with("http://") || agent_address.starts_with("https://") {
        agent_address.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", agent_address.trim_end_matches('/'))
    }
}

/// Build the zone stream URL for a daemon.
///
/// # Errors
///
/// Returns [`AgentError::Other`] if the agent address is not a valid URL.
pub fn zones_url(
    agent_address: &str,
    daemon_name: &str,
    filter: Option<&ZoneFilter>,
) -> Result<Url, AgentError> {
    let base = build_agent_url(agent_address);
    let mut url = Url::parse(&format!("{base}/{AGENT_ZONES_PATH}"))
        .map_err(|e| AgentError::Other(format!("Invalid agent address '{agent_address}': {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("daemon", daemon_name);
        if let Some(filter) = filter {
            if let Some(view) = &filter.view {
                query.append_pair("view", view);
            }
            if let Some(lower_bound) = &filter.lower_bound {
                query.append_pair("lower_bound", lower_bound);
            }
            if let Some(limit) = filter.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
    }
    Ok(url)
}

/// [`ZoneStreamer`] talking to agents over HTTP.
#[derive(Clone, Debug)]
pub struct HttpZoneStreamer {
    client: HttpClient,
    retry_budget: Option<Duration>,
}

impl HttpZoneStreamer {
    /// Create a streamer whose requests give up connecting after `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Other`] if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration) -> Result<Self, AgentError> {
        let client = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AgentError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    #[must_use]
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            retry_budget: None,
        }
    }

    /// Limit the total time spent retrying to open a stream. Defaults to the
    /// budget of [`agent_backoff`].
    #[must_use]
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = Some(budget);
        self
    }
}

impl ZoneStreamer for HttpZoneStreamer {
    fn receive_zones(&self, daemon: &Daemon, filter: Option<&ZoneFilter>) -> ZoneStream {
        let url = match zones_url(&daemon.agent_address, &daemon.name, filter) {
            Ok(url) => url,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let reader = LineReader {
            request: AgentRequest {
                client: self.client.clone(),
                url,
                agent: daemon.agent_address.clone(),
                retry_budget: self.retry_budget,
            },
            daemon_id: daemon.id,
            body: None,
            buffer: Vec::new(),
            done: false,
        };
        stream::unfold(reader, |mut reader| async move {
            let item = reader.next_item().await?;
            Some((item, reader))
        })
        .boxed()
    }
}

/// Zone stream request of one daemon.
struct AgentRequest {
    client: HttpClient,
    url: Url,
    agent: String,
    retry_budget: Option<Duration>,
}

/// Splits the response body into lines and decodes them one at a time.
struct LineReader {
    request: AgentRequest,
    daemon_id: i64,
    body: Option<BodyStream>,
    buffer: Vec<u8>,
    done: bool,
}

impl LineReader {
    async fn next_item(&mut self) -> Option<Result<ExtendedZone, AgentError>> {
        if self.done {
            return None;
        }
        match self.read_zone().await {
            Ok(Some(zone)) => Some(Ok(zone)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    async fn read_zone(&mut self) -> Result<Option<ExtendedZone>, AgentError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return decode_line(&line, self.daemon_id).map(Some);
            }

            if self.body.is_none() {
                self.body = Some(self.request.open().await?);
            }
            let chunk = match self.body.as_mut() {
                Some(body) => body.next().await,
                None => None,
            };
            match chunk {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    return Err(AgentError::Other(format!(
                        "Failed to read zones from agent {}: {e}",
                        self.request.agent
                    )));
                }
                None => {
                    // Last line may lack the newline
                    let rest = std::mem::take(&mut self.buffer);
                    if rest.iter().all(u8::is_ascii_whitespace) {
                        return Ok(None);
                    }
                    return decode_line(&rest, self.daemon_id).map(Some);
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|byte| *byte == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}

impl AgentRequest {
    /// Send the request, retrying transient failures.
    async fn open(&self) -> Result<BodyStream, AgentError> {
        let mut backoff = agent_backoff();
        if self.retry_budget.is_some() {
            backoff.max_elapsed_time = self.retry_budget;
        }
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (retryable, message) = match self.client.get(self.url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        url = %self.url,
                        attempt = attempt,
                        "Receiving zones from agent"
                    );
                    return Ok(response
                        .bytes_stream()
                        .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                        .boxed());
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    (
                        is_retryable_http_status(status),
                        format!("Agent {} returned HTTP {status}: {}", self.agent, text.trim()),
                    )
                }
                Err(e) => (
                    e.is_connect() || e.is_timeout(),
                    format!("Failed to send request to agent {}: {e}", self.agent),
                ),
            };

            if !retryable {
                error!(
                    url = %self.url,
                    error = %message,
                    "Non-retryable agent error, failing immediately"
                );
                return Err(AgentError::Other(message));
            }

            let Some(duration) = backoff.next_backoff() else {
                error!(
                    url = %self.url,
                    attempt = attempt,
                    error = %message,
                    "Agent retries exhausted, giving up"
                );
                return Err(AgentError::Other(format!(
                    "Backoff exhausted after {attempt} attempts: {message}"
                )));
            };
            warn!(
                url = %self.url,
                attempt = attempt,
                retry_after = ?duration,
                error = %message,
                "Retryable agent error, will retry"
            );
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
