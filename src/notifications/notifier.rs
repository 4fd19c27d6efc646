//! Delivery surfaces for fired notifications.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{NotificationConfig, Secrets};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!(title, body, "Notification");
        Ok(())
    }
}

/// Posts notifications to a Discord-compatible webhook.
pub struct WebhookNotifier {
    url: String,
    username: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: String,
    username: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: "skycast".to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        let payload = WebhookMessage {
            content: format!("**{title}**\n{body}"),
            username: &self.username,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send webhook notification")?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook returned {}", response.status());
        }
        Ok(())
    }
}

/// Webhook delivery when it is enabled and a URL is set, log delivery otherwise.
pub fn build_notifier(config: &NotificationConfig, secrets: &Secrets) -> Arc<dyn Notifier> {
    match (&secrets.notify_webhook_url, config.webhook_enabled) {
        (Some(url), true) => Arc::new(WebhookNotifier::new(url.clone())),
        (None, true) => {
            warn!("Webhook notifications enabled but NOTIFY_WEBHOOK_URL is not set");
            Arc::new(LogNotifier)
        }
        _ => Arc::new(LogNotifier),
    }
}
