//! Discord webhook delivery.

use super::{Notifier, NotifyError};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Longest `content` a webhook accepts.
pub const DISCORD_CONTENT_LIMIT: usize = 2000;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts messages to Discord webhook URLs.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, endpoint: &str, message: &str) -> Result<(), NotifyError> {
        if endpoint.trim().is_empty() {
            tracing::debug!("No webhook configured, dropping message");
            return Ok(());
        }

        let content = truncate_content(message, DISCORD_CONTENT_LIMIT);
        let response = self
            .client
            .post(endpoint)
            .json(&WebhookPayload { content: &content })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout)
                } else {
                    NotifyError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        Ok(())
    }
}

/// Cut `message` down to at most `limit` characters, marking the cut.
fn truncate_content(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }

    let mut out: String = message.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}
