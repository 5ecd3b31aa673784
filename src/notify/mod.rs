//! Notification delivery and message formatting.

mod discord;
mod format;

pub use discord::*;
pub use format::*;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("endpoint rejected message with status {0}")]
    Rejected(u16),
}

/// Best-effort delivery of a text message to an endpoint.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, endpoint: &str, message: &str) -> Result<(), NotifyError>;
}
