//! Telegram Bot API notifier

use super::{NotifyError, Notifier};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Bot API base URL
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Longest message the Bot API accepts
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

const ELLIPSIS: &str = "...";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages through `sendMessage`
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    bot_api_key: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Notifier for the public Bot API
    pub fn new(bot_api_key: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_base_url(TELEGRAM_API_URL, bot_api_key, chat_id)
    }

    /// Notifier against another endpoint (mock servers, proxies)
    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_api_key: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_api_key: bot_api_key.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_api_key);
        let text = truncate_message(message);

        debug!(chat_id = %self.chat_id, chars = text.chars().count(), "Sending Telegram message");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text.as_str()),
                ("parse_mode", "Markdown"),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| NotifyError::Http(e.without_url().to_string()))?;

        if status != 200 {
            return Err(NotifyError::Rejected {
                status,
                description: body,
            });
        }

        let parsed: TelegramResponse =
            serde_json::from_str(&body).map_err(|e| NotifyError::Http(e.to_string()))?;
        if !parsed.ok {
            return Err(NotifyError::Rejected {
                status,
                description: parsed
                    .description
                    .unwrap_or_else(|| "ok=false".to_string()),
            });
        }

        info!(chat_id = %self.chat_id, "Telegram notification sent");
        Ok(())
    }
}

/// Cut a message to the Bot API limit, marking the cut with `...`
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= TELEGRAM_MAX_MESSAGE_CHARS {
        return message.to_string();
    }

    let keep = TELEGRAM_MAX_MESSAGE_CHARS - ELLIPSIS.len();
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Escape the characters legacy `Markdown` parse mode treats as entity markers
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
