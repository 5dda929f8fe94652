//! Success notifications

use async_trait::async_trait;

mod telegram;

pub use telegram::{
    escape_markdown, truncate_message, TelegramNotifier, TELEGRAM_API_URL,
    TELEGRAM_MAX_MESSAGE_CHARS,
};

/// Notification errors. The poll loop logs these and carries on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Request could not be sent
    #[error("HTTP error: {0}")]
    Http(String),

    /// Service answered but refused the message
    #[error("notification rejected (status {status}): {description}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Service-provided reason
        description: String,
    },
}

/// Delivers a short text message to the operator
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message`
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}
