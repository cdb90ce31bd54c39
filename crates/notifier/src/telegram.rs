//! Telegram Bot API delivery channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::{
    LinkButton, MessageChannel, OutgoingMessage, RetryPolicy, SendError, SendReport,
    is_retryable_status,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends messages through `sendMessage` with HTML parse mode.
pub struct TelegramChannel {
    http: reqwest::Client,
    api_url: String,
    bot_token: Option<String>,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: [&'a [LinkButton]; 1],
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        if bot_token.is_none() {
            tracing::warn!("TELEGRAM_BOT_TOKEN not configured, deliveries will fail");
        } else {
            tracing::info!("Telegram bot configured");
        }

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token,
            retry,
        })
    }

    async fn post_once(
        &self,
        token: &str,
        address: &str,
        message: &OutgoingMessage,
    ) -> Result<(), SendError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, token);
        let body = SendMessageRequest {
            chat_id: address,
            text: &message.text,
            parse_mode: "HTML",
            reply_markup: (!message.buttons.is_empty()).then(|| InlineKeyboard {
                inline_keyboard: [message.buttons.as_slice()],
            }),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TelegramResponse>()
                .await
                .ok()
                .and_then(|r| r.description)
                .unwrap_or_else(|| status.to_string());
            let detail = format!("HTTP {}: {}", status.as_u16(), detail);
            return Err(if is_retryable_status(status.as_u16()) {
                SendError::Retryable(detail)
            } else {
                SendError::Terminal(detail)
            });
        }

        let parsed: TelegramResponse = response
            .json()
            .await
            .map_err(|e| SendError::Terminal(format!("Malformed Telegram response: {}", e)))?;

        if parsed.ok {
            Ok(())
        } else {
            Err(SendError::Terminal(
                parsed
                    .description
                    .unwrap_or_else(|| "Telegram rejected the message".to_string()),
            ))
        }
    }
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    async fn send(&self, address: &str, message: &OutgoingMessage) -> SendReport {
        let Some(token) = self.bot_token.as_deref() else {
            return SendReport {
                delivered: false,
                attempts: 0,
                error: Some("Telegram bot token not configured".to_string()),
            };
        };

        let report = self
            .retry
            .run(|_| self.post_once(token, address, message))
            .await;

        if report.delivered {
            tracing::info!(chat_id = %address, attempts = report.attempts, "Message sent");
        } else {
            tracing::error!(
                chat_id = %address,
                attempts = report.attempts,
                error = report.error.as_deref().unwrap_or_default(),
                "Failed to send Telegram message"
            );
        }
        report
    }
}

/// Transport failures before an HTTP status was received.
fn classify_transport_error(err: reqwest::Error) -> SendError {
    // The URL embeds the bot token; never let it reach logs.
    let err = err.without_url();
    if err.is_timeout() || err.is_connect() || err.is_request() {
        SendError::Retryable(err.to_string())
    } else {
        SendError::Terminal(err.to_string())
    }
}
