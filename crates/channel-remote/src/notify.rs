//! Free-text notification delivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// Delivers a message to humans.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> RemoteResult<()>;
}

/// Prints messages to stdout. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn notify(&self, message: &str) -> RemoteResult<()> {
        println!("{message}");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts messages to a chat incoming webhook as `{"text": ...}`.
pub struct WebhookNotifier {
    webhook: String,
    header: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    /// `header` is prepended to every message on its own line.
    pub fn new(webhook: &str, header: &str) -> Self {
        Self {
            webhook: webhook.to_string(),
            header: header.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn render(&self, message: &str) -> String {
        if self.header.is_empty() {
            message.to_string()
        } else {
            format!("{}\n{}", self.header, message)
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> RemoteResult<()> {
        let text = self.render(message);
        let response = self
            .http_client
            .post(&self.webhook)
            .json(&WebhookPayload { text: &text })
            .send()
            .await
            .map_err(|e| RemoteError::Notify(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RemoteError::Notify(format!(
                "webhook returned HTTP {}",
                response.status().as_u16()
            )));
        }
        debug!(bytes = text.len(), "delivered notification");
        Ok(())
    }
}

/// Webhook notifier when `webhook` is set, stdout otherwise.
pub fn notifier_for(webhook: Option<&str>, header: &str) -> Arc<dyn Notifier> {
    match webhook.filter(|w| !w.is_empty()) {
        Some(webhook) => Arc::new(WebhookNotifier::new(webhook, header)),
        None => Arc::new(StdoutNotifier),
    }
}
