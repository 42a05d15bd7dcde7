//! Error types for the HTTP service

use crate::responses::WebhookResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bitrix_relay_core::RelayError;
use tracing::warn;

/// Webhook handler errors
///
/// Bitrix24 treats any non-2xx answer as a failed delivery and keeps
/// re-sending, so every relay failure is answered with `200 OK` and an
/// `{"ok": false, "error": ...}` body. Only the short public message is
/// returned; the detailed cause is logged server-side.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// The relay pipeline stopped before anything was sent.
    #[error("Relay failed: {0}")]
    Relay(#[from] RelayError),
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::Relay(ref e) => {
                warn!(
                    error = %e,
                    category = e.category(),
                    "Webhook rejected"
                );
                (
                    StatusCode::OK,
                    Json(WebhookResponse::rejected(e.public_message())),
                )
                    .into_response()
            }
        }
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),

    #[error("Failed to build HTTP client: {message}")]
    HttpClient { message: String },
}
