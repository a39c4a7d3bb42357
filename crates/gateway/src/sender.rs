use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use deskpilot_core::config::GatewayConfig;

use crate::messages::OutboundMessage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("gateway returned HTTP {status}")]
    Http { status: u16 },
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway send timed out after {0}s")]
    Timeout(u64),
    #[error("gateway client could not be built: {0}")]
    Setup(String),
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends `message`; returns the channel's message id when the gateway
    /// reports one.
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, SendError>;
}

/// `POST {base_url}/messages` with an `apikey` header.
pub struct HttpMessageSender {
    client: Client,
    base_url: String,
    api_key: SecretString,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default, alias = "id")]
    message_id: Option<String>,
}

impl HttpMessageSender {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| SendError::Setup(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, SendError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("apikey", self.api_key.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    SendError::Timeout(self.timeout_secs)
                } else {
                    SendError::Transport(error.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(SendError::Http { status: response.status().as_u16() });
        }

        // Some gateways answer 204 or a body without an id; both are fine.
        let message_id = response
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|body| body.message_id)
            .filter(|id| !id.trim().is_empty());
        debug!(
            event_name = "gateway.message_sent",
            instance_id = %message.instance_id,
            contact_id = %message.to,
            message_id = message_id.as_deref().unwrap_or("unknown"),
            "outbound message accepted by gateway"
        );
        Ok(message_id)
    }
}

/// Used when no gateway is configured: messages are logged, not delivered.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMessageSender;

#[async_trait]
impl MessageSender for NoopMessageSender {
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, SendError> {
        info!(
            event_name = "gateway.send_skipped",
            instance_id = %message.instance_id,
            contact_id = %message.to,
            "gateway not configured; outbound message not delivered"
        );
        Ok(None)
    }
}

/// Keeps every sent message, optionally failing all sends.
#[derive(Default)]
pub struct InMemoryMessageSender {
    sent: Mutex<Vec<OutboundMessage>>,
    failure: Option<SendError>,
}

impl InMemoryMessageSender {
    pub fn failing(error: SendError) -> Self {
        Self { sent: Mutex::new(Vec::new()), failure: Some(error) }
    }

    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageSender for InMemoryMessageSender {
    async fn send(&self, message: &OutboundMessage) -> Result<Option<String>, SendError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let mut sent = self.sent.lock().await;
        sent.push(message.clone());
        Ok(Some(format!("out-{}", sent.len())))
    }
}

/// HTTP sender when a gateway URL and key are configured, otherwise no-op.
pub fn sender_from_config(config: &GatewayConfig) -> Result<Box<dyn MessageSender>, SendError> {
    match (&config.base_url, &config.api_key) {
        (Some(base_url), Some(api_key)) => Ok(Box::new(HttpMessageSender::new(
            base_url.clone(),
            api_key.clone(),
            config.send_timeout_secs,
        )?)),
        _ => Ok(Box::new(NoopMessageSender)),
    }
}
