//! Best-effort chat notification after a store was rebuilt.
//!
//! Notification failures are logged and swallowed; they never fail a store run.

use crate::dispatch::{map_http_error, map_status};
use crate::error::{RebuildError, TransportError};
use crate::types::StoreRef;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Chat notification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Send a message after each rebuilt store
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Channel id receiving the messages
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Bot token (falls back to SLACK_API_TOKEN)
    #[serde(default)]
    pub token: Option<String>,

    /// chat.postMessage endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_channel() -> String {
    "catalog-rules".to_string()
}

fn default_api_url() -> String {
    "https://slack.com/api/chat.postMessage".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            channel: default_channel(),
            token: None,
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.channel.trim().is_empty() {
            return Err("channel cannot be empty when notifications are enabled".to_string());
        }
        Ok(())
    }

    /// Token from config, then SLACK_API_TOKEN.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("SLACK_API_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }
}

/// Chat client trait
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError>;
}

/// Wraps a chat client with the channel, message text and failure isolation.
pub struct Notifier {
    client: Arc<dyn ChatNotifier>,
    channel: String,
    process_name: String,
}

impl Notifier {
    pub fn new(client: Arc<dyn ChatNotifier>, channel: String, process_name: String) -> Self {
        Self {
            client,
            channel,
            process_name,
        }
    }

    pub fn message_for(&self, store: &StoreRef) -> String {
        format!(
            "Initialized all catalog rules for store_id: {} (process: {})",
            store.store_id, self.process_name
        )
    }

    /// Returns whether the message was delivered.
    pub async fn notify_store(&self, store: &StoreRef) -> bool {
        let text = self.message_for(store);
        match self.client.post_message(&self.channel, &text).await {
            Ok(()) => {
                debug!(store_id = %store, channel = %self.channel, "Store rebuild notification sent");
                true
            }
            Err(err) => {
                warn!(store_id = %store, channel = %self.channel, error = %err, "Store rebuild notification failed");
                false
            }
        }
    }
}

/// Slack `chat.postMessage` client.
pub struct SlackNotifier {
    client: Client,
    api_url: String,
    token: String,
}

impl SlackNotifier {
    pub fn new(api_url: String, token: String, request_timeout: Duration) -> Result<Self, RebuildError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RebuildError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url,
            token,
        })
    }
}

#[async_trait]
impl ChatNotifier for SlackNotifier {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status.as_u16(), error_text));
        }

        // Slack reports API errors in the body of a 200 response.
        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Rejected(format!("Failed to parse response: {}", e)))?;
        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        Err(if reason == "ratelimited" {
            TransportError::Throttled(reason)
        } else {
            TransportError::Rejected(reason)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingChat {
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatNotifier for RecordingChat {
        async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Unavailable("chat down".into()));
            }
            self.sent.lock().push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn sends_store_message_to_channel() {
        let chat = Arc::new(RecordingChat {
            fail: false,
            sent: Mutex::new(Vec::new()),
        });
        let notifier = Notifier::new(chat.clone(), "C1".into(), "initialize_catalog_rules".into());
        assert!(notifier.notify_store(&StoreRef::new("S1")).await);

        let sent = chat.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "C1");
        assert!(sent[0].1.contains("store_id: S1"));
        assert!(sent[0].1.contains("initialize_catalog_rules"));
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        let chat = Arc::new(RecordingChat {
            fail: true,
            sent: Mutex::new(Vec::new()),
        });
        let notifier = Notifier::new(chat, "C1".into(), "p".into());
        assert!(!notifier.notify_store(&StoreRef::new("S1")).await);
    }

    #[test]
    fn enabled_notifications_need_a_channel() {
        let config = NotifyConfig {
            channel: " ".into(),
            ..NotifyConfig::default()
        };
        assert!(config.validate().is_err());
        let disabled = NotifyConfig {
            enabled: false,
            ..config
        };
        assert!(disabled.validate().is_ok());
    }
}
