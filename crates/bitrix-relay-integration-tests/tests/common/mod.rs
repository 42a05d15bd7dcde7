//! Common test utilities for bitrix-relay integration tests
//!
//! This module provides:
//! - Mock implementations of the pipeline traits (TaskFetcher, Notifier)
//! - Helpers for building the router and sending webhook requests
//! - Shared task fixtures

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bitrix_relay_api::{create_router, AppState, ServerConfig};
use bitrix_relay_core::{
    ChatDestination, DeliveryError, FetchError, MessageComposer, NotificationTemplates, Notifier,
    OutboundMessage, TaskFetcher, TaskId, TaskRecord, WebhookRelay,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};
use tower::ServiceExt;

pub const PORTAL_URL: &str = "https://example.bitrix24.ru";
pub const CHAT_ID: &str = "-1001234567890";

// ============================================================================
// Mock Task Fetcher
// ============================================================================

/// Task fetcher serving tasks from memory and recording every lookup
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockTaskFetcher {
    tasks: Arc<Mutex<HashMap<String, TaskRecord>>>,
    failure: Arc<Mutex<Option<FetchError>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockTaskFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(self, task: TaskRecord) -> Self {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
        self
    }

    /// Fail every lookup with `error`.
    pub fn set_failure(&self, error: FetchError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskFetcher for MockTaskFetcher {
    async fn fetch_task(&self, task_id: &TaskId) -> Result<TaskRecord, FetchError> {
        self.calls.lock().unwrap().push(task_id.to_string());

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        self.tasks
            .lock()
            .unwrap()
            .get(task_id.as_str())
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                task_id: task_id.to_string(),
            })
    }
}

// ============================================================================
// Recording Notifier
// ============================================================================

/// Notifier that records every message it is asked to deliver
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failure: Arc<Mutex<Option<DeliveryError>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, error: DeliveryError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until `count` messages were recorded or `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutboundMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let sent = self.sent();
            if sent.len() >= count || Instant::now() >= deadline {
                return sent;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        self.sent.lock().unwrap().push(message.clone());

        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Fixtures and helpers
// ============================================================================

/// The task from the reference scenario: no deadline, mapped responsible party.
#[allow(dead_code)]
pub fn ship_report_task() -> TaskRecord {
    TaskRecord {
        id: "42".to_string(),
        title: "Ship report".to_string(),
        description: None,
        responsible_name: "Кристина Нестерова".to_string(),
        creator_name: "Иван Петров".to_string(),
        creator_id: "1".to_string(),
        group_name: None,
        deadline: None,
    }
}

/// Build a router wired to the given collaborators.
#[allow(dead_code)]
pub fn create_test_app(
    fetcher: Arc<dyn TaskFetcher>,
    notifier: Arc<dyn Notifier>,
    thread_id: Option<i64>,
) -> Router {
    let relay = WebhookRelay::new(
        fetcher,
        notifier,
        MessageComposer::new(Arc::new(NotificationTemplates::default()), PORTAL_URL),
        ChatDestination::new(CHAT_ID, thread_id),
    );
    create_router(AppState::new(ServerConfig::default(), Arc::new(relay)))
}

/// POST a webhook and return the status and decoded JSON body.
#[allow(dead_code)]
pub async fn post_webhook(
    app: Router,
    uri: &str,
    content_type: &str,
    body: impl Into<Body>,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, serde_json::from_slice(&bytes).unwrap())
}
