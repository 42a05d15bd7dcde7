//! # Outbound Notifications
//!
//! The message handed to the chat platform and the [`Notifier`] seam that
//! delivers it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a notification is delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDestination {
    /// Telegram chat id (numeric id or `@channel` username)
    pub chat_id: String,

    /// Forum topic inside the chat; omitted from the send call when `None`
    pub thread_id: Option<i64>,
}

impl ChatDestination {
    pub fn new(chat_id: impl Into<String>, thread_id: Option<i64>) -> Self {
        Self {
            chat_id: chat_id.into(),
            thread_id,
        }
    }
}

impl fmt::Display for ChatDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id {
            Some(thread_id) => write!(f, "{}#{}", self.chat_id, thread_id),
            None => f.write_str(&self.chat_id),
        }
    }
}

/// One formatted notification bound for one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Telegram HTML-formatted text
    pub text: String,
    pub destination: ChatDestination,
}

impl OutboundMessage {
    pub fn new(text: String, destination: ChatDestination) -> Self {
        Self { text, destination }
    }
}

/// Errors while delivering a notification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Messaging API rejected the message: {message}")]
    Rejected { message: String },

    #[error("Messaging API unreachable: {message}")]
    Unreachable { message: String },
}

/// Delivers composed notifications to the chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message. One attempt, no retries.
    async fn notify(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
