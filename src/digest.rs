//! Delivery of the daily usage digest.
//!
//! The digest text is composed from the usage counters in `state::stats`;
//! this module only knows how to hand a finished message to a sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_SUBJECT: &str = "Dare Dash: Daily Summary";

/// Errors that can occur while delivering a digest
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("Delivery request failed: {0}")]
    RequestFailed(String),

    #[error("Delivery endpoint rejected the digest with status {0}")]
    Rejected(u16),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// A finished digest ready to send
#[derive(Debug, Clone, Serialize)]
pub struct DigestMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
}

/// Where digests go
#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Deliver the message, returning a delivery id when the sink has one
    async fn deliver(&self, message: &DigestMessage) -> Result<Option<String>, DigestError>;

    fn name(&self) -> &str;
}

/// Writes the digest to the log. Used when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl DigestSink for LogSink {
    async fn deliver(&self, message: &DigestMessage) -> Result<Option<String>, DigestError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Digest (log only):\n{}",
            message.text
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs the digest as JSON to a mail relay or chat webhook
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

#[derive(serde::Deserialize)]
struct WebhookReply {
    #[serde(default, alias = "messageId")]
    id: Option<String>,
}

impl WebhookSink {
    pub fn new(url: String) -> Result<Self, DigestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DigestError::ConfigError(e.to_string()))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl DigestSink for WebhookSink {
    async fn deliver(&self, message: &DigestMessage) -> Result<Option<String>, DigestError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| DigestError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::Rejected(status.as_u16()));
        }

        // Relays that answer with an id get it recorded; anything else is fine too
        let id = response
            .json::<WebhookReply>()
            .await
            .ok()
            .and_then(|reply| reply.id);
        Ok(id)
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Digest configuration
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub to: String,
    pub from: String,
    /// When unset, digests are only logged
    pub webhook_url: Option<String>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            to: "owner@localhost".to_string(),
            from: "no-reply@localhost".to_string(),
            webhook_url: None,
        }
    }
}

impl DigestConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        let to = std::env::var("DIGEST_TO").unwrap_or(d.to);
        let from = std::env::var("DIGEST_FROM").unwrap_or(d.from);
        let webhook_url = std::env::var("DIGEST_WEBHOOK_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        tracing::info!(
            to = %to,
            webhook = webhook_url.is_some(),
            "Digest config loaded"
        );

        Self {
            to,
            from,
            webhook_url,
        }
    }
}

/// Outcome of the last delivery attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatus {
    pub at: DateTime<Utc>,
    pub ok: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub to: String,
    pub from: String,
    pub sink: String,
}

fn non_blank_or(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

pub struct DigestService {
    pub config: DigestConfig,
    sink: Box<dyn DigestSink>,
    last_status: RwLock<Option<DeliveryStatus>>,
}

impl DigestService {
    /// Pick the sink from config, falling back to the log sink
    pub fn new(config: DigestConfig) -> Self {
        let sink: Box<dyn DigestSink> = match config.webhook_url.clone() {
            Some(url) => match WebhookSink::new(url) {
                Ok(sink) => Box::new(sink),
                Err(e) => {
                    tracing::warn!("Digest webhook unavailable, logging instead: {}", e);
                    Box::new(LogSink)
                }
            },
            None => Box::new(LogSink),
        };
        Self::with_sink(config, sink)
    }

    pub fn with_sink(config: DigestConfig, sink: Box<dyn DigestSink>) -> Self {
        Self {
            config,
            sink,
            last_status: RwLock::new(None),
        }
    }

    /// Send `text`, recording the outcome. Blank overrides use configured defaults.
    pub async fn deliver(
        &self,
        text: String,
        to: Option<&str>,
        subject: Option<&str>,
    ) -> Result<DeliveryStatus, DigestError> {
        let message = DigestMessage {
            to: non_blank_or(to, &self.config.to),
            from: self.config.from.clone(),
            subject: non_blank_or(subject, DEFAULT_SUBJECT),
            text,
        };

        tracing::info!(
            to = %message.to,
            sink = self.sink.name(),
            "Sending digest"
        );
        let result = self.sink.deliver(&message).await;

        let status = DeliveryStatus {
            at: Utc::now(),
            ok: result.is_ok(),
            message_id: result.as_ref().ok().cloned().flatten(),
            error: result.as_ref().err().map(|e| e.to_string()),
            to: message.to,
            from: message.from,
            sink: self.sink.name().to_string(),
        };
        *self.last_status.write().await = Some(status.clone());

        match result {
            Ok(_) => Ok(status),
            Err(e) => {
                tracing::error!("Failed to send digest: {}", e);
                Err(e)
            }
        }
    }

    pub async fn last_status(&self) -> Option<DeliveryStatus> {
        self.last_status.read().await.clone()
    }
}
