//! Integration tests for the webhook pipeline
//!
//! These tests drive the full router with in-memory collaborators and check
//! what reaches the chat for each kind of inbound request.

mod common;

use axum::http::StatusCode;
use bitrix_relay_core::{DeliveryError, FetchError};
use common::{
    create_test_app, post_webhook, ship_report_task, MockTaskFetcher, RecordingNotifier, CHAT_ID,
    PORTAL_URL,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

/// Verify the reference scenario end to end
///
/// A JSON body `{"id": "42"}` for a task without a deadline produces one
/// message tagging the responsible party, naming the task, and marking the
/// deadline as unspecified.
#[tokio::test]
async fn test_json_webhook_delivers_notification() {
    // Arrange
    let fetcher = MockTaskFetcher::new().with_task(ship_report_task());
    let notifier = RecordingNotifier::new();
    let app = create_test_app(Arc::new(fetcher.clone()), Arc::new(notifier.clone()), Some(7));

    // Act
    let (status, body) =
        post_webhook(app, "/bitrix-webhook", "application/json", r#"{"id": "42"}"#).await;

    // Assert: immediate acknowledgement
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "message": "Task 42 processed"}));
    assert_eq!(fetcher.calls(), vec!["42".to_string()]);

    // Assert: the detached delivery produced exactly one message
    let sent = notifier.wait_for(1, WAIT).await;
    assert_eq!(sent.len(), 1, "Expected exactly one notification");

    let message = &sent[0];
    assert_eq!(message.destination.chat_id, CHAT_ID);
    assert_eq!(message.destination.thread_id, Some(7));
    assert!(message.text.starts_with("@tinatinulya, "));
    assert!(message.text.contains("🆕 <b>Новая задача</b>"));
    assert!(message.text.contains("🆔 <b>ID:</b> 42"));
    assert!(message.text.contains("📌 <b>Задача:</b> Ship report"));
    assert!(message.text.contains("⏰ <b>Дедлайн:</b> не указан"));
    assert!(message.text.contains(&format!(
        "{PORTAL_URL}/company/personal/user/1/tasks/task/view/42/"
    )));
}

/// Verify that an unsubstituted placeholder stops the pipeline before any lookup
#[tokio::test]
async fn test_placeholder_task_id_is_rejected() {
    let fetcher = MockTaskFetcher::new().with_task(ship_report_task());
    let notifier = RecordingNotifier::new();
    let app = create_test_app(Arc::new(fetcher.clone()), Arc::new(notifier.clone()), None);

    let (status, body) = post_webhook(
        app,
        "/bitrix-webhook",
        "application/json",
        r#"{"id": "{{task_id}}"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": false, "error": "No valid task id"}));
    assert_eq!(fetcher.call_count(), 0, "Tracker must not be queried");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(notifier.sent().is_empty(), "Nothing must be sent");
}

/// Verify that a tracker failure is reported and nothing is sent
#[tokio::test]
async fn test_tracker_failure_is_reported_as_not_found() {
    let fetcher = MockTaskFetcher::new();
    fetcher.set_failure(FetchError::Unreachable {
        message: "connection refused".to_string(),
    });
    let notifier = RecordingNotifier::new();
    let app = create_test_app(Arc::new(fetcher.clone()), Arc::new(notifier.clone()), None);

    let (status, body) =
        post_webhook(app, "/bitrix-webhook", "application/json", r#"{"id": "42"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": false, "error": "Task not found"}));
    assert_eq!(fetcher.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(notifier.sent().is_empty(), "Nothing must be sent");
}

/// Verify that the JSON, form, and query encodings resolve to the same task
#[tokio::test]
async fn test_all_encodings_resolve_same_task() {
    let fetcher = MockTaskFetcher::new().with_task(ship_report_task());
    let notifier = RecordingNotifier::new();

    let requests = [
        ("/bitrix-webhook", "application/json", r#"{"task_id": 42}"#),
        (
            "/bitrix-webhook",
            "application/x-www-form-urlencoded",
            "event=ONTASKUPDATE&data%5BFIELDS_AFTER%5D%5BID%5D=42",
        ),
        (
            "/bitrix-webhook?document_id%5B2%5D=TASK_42",
            "text/plain",
            "",
        ),
    ];

    for (uri, content_type, body) in requests {
        let app = create_test_app(Arc::new(fetcher.clone()), Arc::new(notifier.clone()), None);
        let (status, response) = post_webhook(app, uri, content_type, body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response["ok"], true,
            "Request to {uri} with body {body:?} was rejected: {response}"
        );
    }

    assert_eq!(fetcher.calls(), vec!["42", "42", "42"]);
    assert_eq!(notifier.wait_for(3, WAIT).await.len(), 3);
}

/// Verify that the acknowledgement does not wait for the chat platform
#[tokio::test]
async fn test_slow_delivery_does_not_delay_response() {
    let fetcher = MockTaskFetcher::new().with_task(ship_report_task());
    let notifier = RecordingNotifier::new();
    notifier.set_delay(Duration::from_millis(500));
    let app = create_test_app(Arc::new(fetcher), Arc::new(notifier.clone()), None);

    let start = std::time::Instant::now();
    let (_, body) =
        post_webhook(app, "/bitrix-webhook", "application/json", r#"{"id": "42"}"#).await;
    let response_time = start.elapsed();

    assert_eq!(body["ok"], true);
    assert!(
        response_time < Duration::from_millis(400),
        "Response took {}ms, expected it before delivery finished",
        response_time.as_millis()
    );
    assert!(notifier.sent().is_empty());
    assert_eq!(notifier.wait_for(1, WAIT).await.len(), 1);
}

/// Verify that a failed delivery still leaves a positive acknowledgement
#[tokio::test]
async fn test_delivery_failure_is_not_reported_to_caller() {
    let fetcher = MockTaskFetcher::new().with_task(ship_report_task());
    let notifier = RecordingNotifier::new();
    notifier.set_failure(DeliveryError::Rejected {
        message: "Bad Request: chat not found".to_string(),
    });
    let app = create_test_app(Arc::new(fetcher), Arc::new(notifier.clone()), None);

    let (status, body) =
        post_webhook(app, "/bitrix-webhook", "application/json", r#"{"id": "42"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(notifier.wait_for(1, WAIT).await.len(), 1);
}

/// Verify that a body which is neither JSON nor form data is malformed
#[tokio::test]
async fn test_unparseable_body_is_malformed() {
    let fetcher = MockTaskFetcher::new();
    let notifier = RecordingNotifier::new();
    let app = create_test_app(Arc::new(fetcher.clone()), Arc::new(notifier), None);

    let (status, body) =
        post_webhook(app, "/bitrix-webhook", "text/plain", "definitely not a payload").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": false, "error": "Malformed request"}));
    assert_eq!(fetcher.call_count(), 0);
}
