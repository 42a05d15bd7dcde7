//! # Bitrix Relay HTTP Service
//!
//! HTTP server receiving Bitrix24 task webhooks and relaying them to
//! Telegram through [`bitrix_relay_core::WebhookRelay`].
//!
//! This crate provides:
//! - The `/bitrix-webhook` endpoint and its liveness probe
//! - A health check endpoint
//! - Service configuration loading
//! - Reqwest clients for Bitrix24, Telegram, and the language model
//! - The chat-command assistant

pub mod assistant;
pub mod bitrix;
pub mod config;
pub mod errors;
pub mod llm;
pub mod responses;
pub mod telegram;

pub use assistant::{BotCommand, CommandBot, TaskDirectory};
pub use bitrix::BitrixClient;
pub use config::{
    AssistantConfig, BitrixConfig, LoggingConfig, ServerConfig, ServiceConfig, TelegramConfig,
    TemplatesConfig,
};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use llm::{LanguageModel, OpenAiClient};
pub use responses::{HealthResponse, WebhookResponse};
pub use telegram::TelegramClient;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::Uri,
    middleware,
    response::{Json, Response},
    routing::get,
    Extension, Router,
};
use bitrix_relay_core::{payload::normalize, RawRequest, WebhookRelay};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

/// Path Bitrix24 webhooks are posted to
pub const WEBHOOK_PATH: &str = "/bitrix-webhook";

/// Header carrying the request correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Correlation id of the current request
///
/// Taken from [`CORRELATION_ID_HEADER`] or generated, then stored in the
/// request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(|| Self(uuid::Uuid::new_v4().to_string()))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook-to-notification pipeline
    pub relay: Arc<WebhookRelay>,
}

impl AppState {
    /// Create new application state
    pub fn new(server: ServerConfig, relay: Arc<WebhookRelay>) -> Self {
        Self { server, relay }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes =
        Router::new().route(WEBHOOK_PATH, get(webhook_liveness).post(handle_webhook));

    let health_routes = Router::new().route("/health", get(handle_health_check));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(http_request_span))
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::max(state.server.max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and serve until SIGINT or SIGTERM
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let address = state.server.bind_address();
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!(address = %address, "Starting HTTP server");

    // In-flight requests finish; spawned deliveries are dropped with the runtime.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle a Bitrix24 webhook
///
/// The body may be JSON, form-encoded, or empty with the data in the query
/// string. The response is always `200 OK`; failures are reported in the
/// body. The notification itself is sent on a detached task, so the answer
/// does not wait for Telegram.
///
/// Only field names are logged. Event webhooks carry `auth[...]` tokens in
/// their values.
#[instrument(
    skip(state, correlation_id, uri, body),
    fields(correlation_id = %correlation_id, body_len = body.len())
)]
pub async fn handle_webhook(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    uri: Uri,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    let payload = normalize(&RawRequest::new(&body, uri.query()));

    debug!(
        encoding = ?payload.encoding(),
        fields = ?payload.field_names(),
        "Webhook received"
    );

    let outcome = state.relay.relay(&payload).await?;

    info!(
        task_id = %outcome.task_id,
        kind = %outcome.kind,
        "Webhook accepted"
    );

    Ok(Json(WebhookResponse::accepted(&outcome.task_id)))
}

/// Liveness probe used while configuring the webhook in Bitrix24
async fn webhook_liveness() -> Json<WebhookResponse> {
    Json(WebhookResponse::alive())
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// ============================================================================
// Middleware
// ============================================================================

/// Span for the `tower-http` trace layer, naming the path but not the query
fn http_request_span(request: &axum::http::Request<axum::body::Body>) -> tracing::Span {
    tracing::debug_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Request logging middleware with correlation ID tracking
///
/// Attaches a [`CorrelationId`] to the request, echoes it in the response
/// headers, and logs one line per request at a level chosen by status
/// class. Only the path is logged: query-string webhooks carry their payload
/// in the query.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    path = %request.uri().path(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = std::time::Instant::now();
    let correlation_id = CorrelationId::from_headers(request.headers());

    tracing::Span::current().record("correlation_id", correlation_id.0.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(header_value) = correlation_id.0.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(status = status.as_u16(), duration_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(status = status.as_u16(), duration_ms, "Request rejected");
    } else {
        info!(status = status.as_u16(), duration_ms, "Request completed");
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
