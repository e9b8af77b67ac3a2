//! Outbound dispatch — the `MessageDispatcher` seam and the response
//! composer used to turn an accepted lead plus a chosen variant into the
//! text that gets sent. Every send is gated by the rate limiter before it
//! reaches a dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::DispatchError;

/// Sends a rendered response to a recipient. Pure I/O, no business logic.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    fn name(&self) -> &str;

    /// Send `text` to `recipient`, returning the channel-native message id.
    async fn send(&self, recipient: &str, text: &str) -> Result<String, DispatchError>;
}

/// Renders the outbound response for an accepted lead.
///
/// The real renderer is an external collaborator; this seam lets the
/// pipeline stay agnostic to how drafts are produced.
pub trait ResponseComposer: Send + Sync {
    fn compose(&self, lead_text: &str, variant: &str, topic: Option<&str>) -> String;
}

/// Minimal template-based composer — one opening line per variant.
pub struct TemplateComposer;

impl ResponseComposer for TemplateComposer {
    fn compose(&self, lead_text: &str, variant: &str, topic: Option<&str>) -> String {
        let vertical = topic.unwrap_or("this area");
        let opener = match variant {
            "direct" => format!("Saw your request — I do {vertical} work and can start right away."),
            "technical" => format!(
                "Your request caught my eye. A quick note on how I'd approach the {vertical} side:"
            ),
            "consultative" => format!(
                "Happy to help you scope this out — a short call about your {vertical} goals would tell us a lot."
            ),
            _ => format!("Hello! I noticed your {vertical} request and would be glad to assist."),
        };

        let preview: String = lead_text.chars().take(120).collect();
        format!("{opener}\n\n> {preview}\n\nWould it make sense to discuss details?")
    }
}

// ── Telegram dispatcher ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendMessageResult {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SendMessageResult>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

/// Telegram Bot API dispatcher.
///
/// Flood-wait (HTTP 429) is retried with a bounded iterative loop honoring
/// the server-provided `retry_after`, never recursively and never more
/// than `MAX_SEND_ATTEMPTS` times.
pub struct TelegramDispatcher {
    bot_token: String,
    client: reqwest::Client,
}

/// Upper bound on send attempts per message, flood-waits included.
const MAX_SEND_ATTEMPTS: u32 = 3;

/// Fallback pause when a 429 carries no retry_after.
const DEFAULT_FLOOD_WAIT: Duration = Duration::from_secs(3);

impl TelegramDispatcher {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    async fn send_once(&self, recipient: &str, text: &str) -> Result<String, SendFailure> {
        let body = serde_json::json!({
            "chat_id": recipient,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SendFailure::Fatal(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let wait = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.parameters)
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FLOOD_WAIT);
            return Err(SendFailure::FloodWait(wait));
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SendFailure::Fatal(format!("status {status}: {detail}")));
        }

        let parsed: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| SendFailure::Fatal(e.to_string()))?;

        match parsed.result {
            Some(result) if parsed.ok => Ok(result.message_id.to_string()),
            _ => Err(SendFailure::Fatal("telegram returned ok=false".to_string())),
        }
    }
}

enum SendFailure {
    FloodWait(Duration),
    Fatal(String),
}

#[async_trait]
impl MessageDispatcher for TelegramDispatcher {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<String, DispatchError> {
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.send_once(recipient, text).await {
                Ok(message_id) => return Ok(message_id),
                Err(SendFailure::FloodWait(wait)) if attempt < MAX_SEND_ATTEMPTS => {
                    warn!(
                        recipient,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "flood wait from telegram, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(SendFailure::FloodWait(_)) => {
                    return Err(DispatchError::SendFailed {
                        recipient: recipient.to_string(),
                        reason: format!("still flood-limited after {MAX_SEND_ATTEMPTS} attempts"),
                    });
                }
                Err(SendFailure::Fatal(reason)) => {
                    warn!(recipient, %reason, "telegram sendMessage failed");
                    return Err(DispatchError::SendFailed {
                        recipient: recipient.to_string(),
                        reason,
                    });
                }
            }
        }
        unreachable!("send loop always returns within MAX_SEND_ATTEMPTS")
    }
}
