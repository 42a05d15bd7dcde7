//! Tests for [`BitrixClient`].

use super::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASK_GET_PATH: &str = "/rest/1/secret/tasks.task.get";
const TASK_LIST_PATH: &str = "/rest/1/secret/tasks.task.list";

fn client_for(server: &MockServer) -> BitrixClient {
    let config = BitrixConfig {
        webhook_url: format!("{}/rest/1/secret", server.uri()),
        timeout_seconds: 1,
        ..BitrixConfig::default()
    };
    BitrixClient::new(&config).unwrap()
}

fn task_id(value: &str) -> TaskId {
    TaskId::new(value).unwrap()
}

// ============================================================================
// tasks.task.get
// ============================================================================

mod fetch_task {
    use super::*;

    /// Verify that a task object is parsed from `result.task`.
    #[tokio::test]
    async fn test_fetch_existing_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_GET_PATH))
            .and(query_param("taskId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "task": {
                        "id": "42",
                        "title": "Ship report",
                        "description": "Quarterly numbers",
                        "deadline": "2024-03-15T10:30:00+03:00",
                        "creator": {"id": "1", "name": "Иван Петров"},
                        "responsible": {"id": "5", "name": "Кристина Нестерова"},
                        "group": []
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let task = client_for(&server).fetch_task(&task_id("42")).await.unwrap();

        assert_eq!(task.id, "42");
        assert_eq!(task.title, "Ship report");
        assert_eq!(task.responsible_name, "Кристина Нестерова");
        assert_eq!(task.creator_id, "1");
        assert_eq!(task.group_name, None);
        assert_eq!(task.deadline.as_deref(), Some("2024-03-15T10:30:00+03:00"));
    }

    /// Verify that a 2xx answer without a task is reported as not found.
    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_GET_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_task(&task_id("7")).await;

        assert_eq!(
            result,
            Err(FetchError::NotFound {
                task_id: "7".to_string()
            })
        );
    }

    /// Verify that a non-JSON 2xx body is reported as not found.
    #[tokio::test]
    async fn test_non_json_body_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_GET_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_task(&task_id("7")).await;

        assert!(result.unwrap_err().is_not_found());
    }

    /// Verify that an error status is surfaced with its body.
    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_GET_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "ERROR_CORE",
                "error_description": "Task not found or access denied"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_task(&task_id("999")).await;

        match result {
            Err(FetchError::HttpStatus { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("ERROR_CORE"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    /// Verify that a slow tracker hits the client timeout.
    #[tokio::test]
    async fn test_timeout_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_GET_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": {"task": {"id": "42"}}}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_task(&task_id("42")).await;

        assert!(matches!(result, Err(FetchError::Unreachable { .. })));
    }
}

// ============================================================================
// tasks.task.list
// ============================================================================

mod list_tasks {
    use super::*;

    /// Verify newest-first ordering is requested and the limit is applied.
    #[tokio::test]
    async fn test_list_applies_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_LIST_PATH))
            .and(query_param("order[ID]", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "tasks": [
                        {"id": "30", "title": "Third"},
                        {"id": "20", "title": "Second"},
                        {"id": "10", "title": "First"}
                    ]
                },
                "total": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tasks = client_for(&server).list_tasks(2).await.unwrap();

        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["30", "20"]);
    }

    /// Verify that an empty result is an empty list.
    #[tokio::test]
    async fn test_list_without_tasks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TASK_LIST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"tasks": []}})))
            .mount(&server)
            .await;

        let tasks = client_for(&server).list_tasks(5).await.unwrap();

        assert!(tasks.is_empty());
    }
}
