//! Queue Dispatcher
//!
//! Publishes a store's batch to the rule-compilation queue. The REMOVE-all marker
//! goes out first as its own single-message publish; the rebuild messages follow in
//! chunks, one serialized JSON array per publish. Chunks are published concurrently
//! and independently; the store run fails once all were attempted if any failed.

use crate::error::{RebuildError, TransportError};
use crate::types::{ChangeBatch, ChangeMessage};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Queue publishing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum messages per publish
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retries per publish after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// SQS-compatible queue URL
    #[serde(default)]
    pub queue_url: Option<String>,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Most messages the compiler queue accepts in one publish.
pub const MAX_CHUNK_SIZE: usize = 100;

fn default_chunk_size() -> usize {
    MAX_CHUNK_SIZE
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            queue_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            ));
        }
        if let Some(url) = &self.queue_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("queue_url must be an http(s) URL, got '{}'", url));
            }
        }
        Ok(())
    }
}

/// Queue client trait
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publish one message body.
    async fn publish(&self, body: String) -> Result<(), TransportError>;
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub chunks: usize,
    pub messages: usize,
}

pub struct QueueDispatcher {
    publisher: Arc<dyn QueuePublisher>,
    config: DispatchConfig,
}

impl QueueDispatcher {
    pub fn new(publisher: Arc<dyn QueuePublisher>, config: DispatchConfig) -> Self {
        Self { publisher, config }
    }

    /// Publish the marker, then the rebuild chunks.
    pub async fn dispatch(&self, batch: &ChangeBatch) -> Result<DispatchReport, RebuildError> {
        let store_id = batch.store_id();
        let marker_body = serde_json::to_string(&[batch.marker()])?;
        if let Err(err) = self.publish_with_retry(marker_body).await {
            error!(store_id, error = %err, "REMOVE-all marker was not published");
            return Err(RebuildError::DispatchFailed {
                store_id: store_id.to_string(),
                failed: 1,
                total: 1,
            });
        }
        debug!(store_id, "REMOVE-all marker published");

        if batch.is_empty() {
            info!(store_id, "Store has no live catalog rows; nothing to rebuild");
            return Ok(DispatchReport::default());
        }

        let bodies = chunk_bodies(batch.rebuild(), self.config.chunk_size)?;
        let total = bodies.len();
        info!(
            store_id,
            messages = batch.rebuild().len(),
            chunks = total,
            "Publishing rebuild chunks"
        );

        let outcomes = join_all(
            bodies
                .into_iter()
                .map(|body| self.publish_with_retry(body)),
        )
        .await;

        let mut failed = 0;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            if let Err(err) = outcome {
                failed += 1;
                error!(store_id, chunk = index, error = %err, "Chunk publish failed");
            }
        }
        if failed > 0 {
            return Err(RebuildError::DispatchFailed {
                store_id: store_id.to_string(),
                failed,
                total,
            });
        }

        Ok(DispatchReport {
            chunks: total,
            messages: batch.rebuild().len(),
        })
    }

    async fn publish_with_retry(&self, body: String) -> Result<(), TransportError> {
        let mut retry_count = 0;
        loop {
            match self.publisher.publish(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if retry_count < self.config.max_retries && err.is_retryable() => {
                    retry_count += 1;
                    warn!(retry_count, error = %err, "Publish failed; retrying");
                    sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Serialize messages into publish bodies of at most `chunk_size` messages each.
pub fn chunk_bodies(
    messages: &[ChangeMessage],
    chunk_size: usize,
) -> Result<Vec<String>, serde_json::Error> {
    messages
        .chunks(chunk_size.max(1))
        .map(|chunk| serde_json::to_string(chunk))
        .collect()
}

/// Publisher that keeps bodies in memory, for dry runs and tests.
#[derive(Default)]
pub struct MemoryQueue {
    bodies: Mutex<Vec<String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published bodies, in publish order.
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().clone()
    }

    /// Published bodies parsed back into message arrays.
    pub fn published(&self) -> Vec<Vec<serde_json::Value>> {
        self.bodies
            .lock()
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }
}

#[async_trait]
impl QueuePublisher for MemoryQueue {
    async fn publish(&self, body: String) -> Result<(), TransportError> {
        self.bodies.lock().push(body);
        Ok(())
    }
}

/// Publisher for SQS-compatible endpoints that accept unsigned `SendMessage`
/// requests (ElasticMQ, LocalStack, or a signing proxy).
pub struct QueueHttpPublisher {
    client: Client,
    queue_url: String,
}

impl QueueHttpPublisher {
    pub fn new(queue_url: String, request_timeout: Duration) -> Result<Self, RebuildError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RebuildError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, queue_url })
    }
}

#[async_trait]
impl QueuePublisher for QueueHttpPublisher {
    async fn publish(&self, body: String) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.queue_url)
            .form(&[("Action", "SendMessage"), ("MessageBody", body.as_str())])
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(map_status(status.as_u16(), error_text))
    }
}

/// Map an HTTP status to a transport error.
pub(crate) fn map_status(status: u16, detail: String) -> TransportError {
    match status {
        429 => TransportError::Throttled(detail),
        500..=599 => TransportError::Unavailable(format!("status {}: {}", status, detail)),
        _ => TransportError::Rejected(format!("status {}: {}", status, detail)),
    }
}

pub(crate) fn map_http_error(error: reqwest::Error) -> TransportError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() || error.is_connect() {
        TransportError::Unavailable(error.to_string())
    } else {
        TransportError::Rejected(error.to_string())
    }
}
