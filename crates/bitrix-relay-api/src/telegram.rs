//! # Telegram Bot API Client
//!
//! Sends notifications with `sendMessage` and receives chat commands with
//! `getUpdates` long polling.

use crate::config::TelegramConfig;
use crate::errors::ConfigError;
use async_trait::async_trait;
use bitrix_relay_core::{ChatDestination, DeliveryError, Notifier, OutboundMessage};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Parse mode used for every outgoing message
pub const PARSE_MODE_HTML: &str = "HTML";

/// Extra time granted on top of the long-poll wait before giving up
const POLL_GRACE_SECONDS: u64 = 10;

/// Errors talking to the Bot API
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// No response arrived (connection failure or timeout).
    #[error("Telegram API unreachable: {message}")]
    Transport { message: String },

    /// The API answered `ok: false`.
    #[error("Telegram API error {status}: {description}")]
    Api { status: u16, description: String },

    /// The response could not be decoded.
    #[error("Invalid Telegram API response: {message}")]
    InvalidResponse { message: String },
}

impl From<TelegramError> for DeliveryError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::Transport { message } => Self::Unreachable { message },
            other => Self::Rejected {
                message: other.to_string(),
            },
        }
    }
}

/// `sendMessage` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub text: String,
    pub parse_mode: &'static str,
    pub disable_web_page_preview: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
}

impl SendMessageRequest {
    /// HTML message without link previews, threaded only when the
    /// destination names a thread.
    pub fn html(destination: &ChatDestination, text: impl Into<String>) -> Self {
        Self {
            chat_id: destination.chat_id.clone(),
            text: text.into(),
            parse_mode: PARSE_MODE_HTML,
            disable_web_page_preview: true,
            message_thread_id: destination.thread_id,
        }
    }
}

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One incoming update from `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// An incoming chat message
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub message_thread_id: Option<i64>,
    pub text: Option<String>,
}

impl Message {
    /// Destination that replies to this message land in.
    pub fn reply_destination(&self) -> ChatDestination {
        ChatDestination::new(self.chat.id.to_string(), self.message_thread_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http_client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<REDACTED>")
            .finish()
    }
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    /// Send one message. One attempt, no retries.
    #[instrument(skip(self, request), fields(chat_id = %request.chat_id))]
    pub async fn send_message(&self, request: &SendMessageRequest) -> Result<(), TelegramError> {
        let response = self
            .http_client
            .post(self.method_url("sendMessage"))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        read_result::<serde_json::Value>(response).await?;
        debug!("Message accepted by Telegram");
        Ok(())
    }

    /// Long-poll for updates newer than `offset`.
    ///
    /// The request timeout is extended past `timeout_seconds` so an idle
    /// poll ends with an empty list rather than a client timeout.
    #[instrument(skip(self))]
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_seconds: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut query = vec![("timeout", timeout_seconds.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .http_client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(Duration::from_secs(timeout_seconds + POLL_GRACE_SECONDS))
            .send()
            .await
            .map_err(transport_error)?;

        read_result::<Vec<Update>>(response).await
    }
}

fn transport_error(e: reqwest::Error) -> TelegramError {
    TelegramError::Transport {
        message: e.to_string(),
    }
}

async fn read_result<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TelegramError> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(transport_error)?;

    let envelope: ApiResponse<T> =
        serde_json::from_slice(&body).map_err(|e| TelegramError::InvalidResponse {
            message: e.to_string(),
        })?;

    if !envelope.ok {
        return Err(TelegramError::Api {
            status,
            description: envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
        });
    }

    envelope.result.ok_or_else(|| TelegramError::InvalidResponse {
        message: "response has no result".to_string(),
    })
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let request = SendMessageRequest::html(&message.destination, message.text.clone());
        self.send_message(&request).await.map_err(DeliveryError::from)
    }
}

#[cfg(test)]
#[path = "telegram_tests.rs"]
mod tests;
