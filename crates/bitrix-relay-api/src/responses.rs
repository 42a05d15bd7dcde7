//! Response bodies returned by the HTTP endpoints.

use bitrix_relay_core::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message returned by the webhook liveness probe
pub const WEBHOOK_ALIVE_MESSAGE: &str = "Webhook is alive";

/// Body of every `/bitrix-webhook` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    /// A webhook that was relayed.
    pub fn accepted(task_id: &TaskId) -> Self {
        Self {
            ok: true,
            error: None,
            message: Some(format!("Task {task_id} processed")),
        }
    }

    /// A webhook the pipeline refused.
    pub fn rejected(error: &str) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            message: None,
        }
    }

    /// Answer to `GET /bitrix-webhook`.
    pub fn alive() -> Self {
        Self {
            ok: true,
            error: None,
            message: Some(WEBHOOK_ALIVE_MESSAGE.to_string()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
