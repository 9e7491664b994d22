//! Delivery of buy events: template rendering and publishers.

use crate::config::{PublisherConfig, PublisherKind};
use crate::monitor::EventReceiver;
use crate::types::BuyEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("publish endpoint answered with status {0}")]
    Status(reqwest::StatusCode),
}

/// Fill the `{mint}`, `{amount}`, `{name}`, `{symbol}`, `{buyer}` and `{signature}`
/// placeholders of `template`. Unknown placeholders are left as they are.
pub fn render_template(template: &str, event: &BuyEvent) -> String {
    template
        .replace("{mint}", &event.mint)
        .replace("{amount}", &event.amount_received.to_string())
        .replace("{name}", &event.token_name)
        .replace("{symbol}", &event.token_symbol)
        .replace("{buyer}", &event.buyer)
        .replace("{signature}", &event.signature)
}

/// Destination for rendered buy events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BuyEvent, message: &str) -> Result<(), PublishError>;
}

/// Writes the rendered message to the log.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &BuyEvent, message: &str) -> Result<(), PublishError> {
        info!(
            buyer = %event.buyer,
            mint = %event.mint,
            signature = %event.signature,
            "{message}"
        );
        Ok(())
    }
}

/// POSTs `{"content": <message>, "event": <BuyEvent>}` to a URL.
pub struct WebhookPublisher {
    http_client: Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    async fn publish(&self, event: &BuyEvent, message: &str) -> Result<(), PublishError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&json!({ "content": message, "event": event }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status()));
        }
        Ok(())
    }
}

/// Publisher selected by the configuration.
pub fn from_config(config: &PublisherConfig) -> Result<Arc<dyn EventPublisher>> {
    let publisher: Arc<dyn EventPublisher> = match config.kind {
        PublisherKind::Log => Arc::new(LogPublisher),
        PublisherKind::Webhook => Arc::new(WebhookPublisher::new(
            config.webhook_url.clone(),
            Duration::from_secs(config.request_timeout_secs.unwrap_or(10)),
        )?),
    };
    Ok(publisher)
}

/// Publish every event received until all senders are gone; returns the delivered count.
///
/// A failed delivery is logged and the loop moves on.
#[instrument(skip_all)]
pub async fn run_publisher(
    mut events: EventReceiver,
    template: String,
    publisher: Arc<dyn EventPublisher>,
) -> u64 {
    let mut delivered = 0;
    while let Some(event) = events.recv().await {
        info!(buyer = %event.buyer, mint = %event.mint, "new buy from a monitored wallet");
        let message = render_template(&template, &event);
        match publisher.publish(&event, &message).await {
            Ok(()) => delivered += 1,
            Err(e) => error!(signature = %event.signature, error = %e, "failed to publish buy event"),
        }
    }
    info!(delivered, "publisher channel closed");
    delivered
}
