//! # Bitrix24 REST Client
//!
//! Loads task records through an inbound REST webhook. The webhook URL
//! already carries the credentials, so calls are plain GETs against
//! `{webhook_url}{method}`.

use crate::assistant::TaskDirectory;
use crate::config::BitrixConfig;
use crate::errors::ConfigError;
use async_trait::async_trait;
use bitrix_relay_core::{FetchError, TaskFetcher, TaskId, TaskRecord};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Bitrix24 REST method returning a single task
const TASK_GET_METHOD: &str = "tasks.task.get";

/// Bitrix24 REST method returning a page of tasks
const TASK_LIST_METHOD: &str = "tasks.task.list";

/// Fields requested from `tasks.task.list`
const LIST_SELECT_FIELDS: [&str; 4] = ["ID", "TITLE", "DEADLINE", "RESPONSIBLE_ID"];

/// Task tracker client backed by the Bitrix24 REST API.
#[derive(Debug, Clone)]
pub struct BitrixClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl BitrixClient {
    /// Create a client with the configured request timeout.
    pub fn new(config: &BitrixConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{}", self.base_url, method)
    }

    /// Call a REST method and return the decoded body of a 2xx response.
    ///
    /// A 2xx body that is not JSON comes back as [`Value::Null`].
    async fn call(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let response = self
            .http_client
            .get(self.method_url(method))
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await.unwrap_or_else(|e| {
            warn!(method, error = %e, "Tracker response is not JSON");
            Value::Null
        }))
    }

    /// List the most recent tasks, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the tracker cannot be reached or answers
    /// with a non-success status.
    #[instrument(skip(self))]
    pub async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskRecord>, FetchError> {
        let mut query = vec![("order[ID]", "desc")];
        query.extend(LIST_SELECT_FIELDS.iter().map(|field| ("select[]", *field)));

        let body = self.call(TASK_LIST_METHOD, &query).await?;

        let tasks = body
            .pointer("/result/tasks")
            .and_then(Value::as_array)
            .map(|tasks| {
                tasks
                    .iter()
                    .filter_map(TaskRecord::from_api_value)
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();

        Ok(tasks)
    }
}

#[async_trait]
impl TaskFetcher for BitrixClient {
    #[instrument(skip(self, task_id), fields(task_id = %task_id))]
    async fn fetch_task(&self, task_id: &TaskId) -> Result<TaskRecord, FetchError> {
        let body = self
            .call(TASK_GET_METHOD, &[("taskId", task_id.as_str())])
            .await
            .inspect_err(|e| warn!(error = %e, "Task lookup failed"))?;

        let task = body
            .pointer("/result/task")
            .and_then(TaskRecord::from_api_value)
            .ok_or_else(|| FetchError::NotFound {
                task_id: task_id.to_string(),
            })?;

        debug!(title = %task.title, "Task loaded");
        Ok(task)
    }
}

#[async_trait]
impl TaskDirectory for BitrixClient {
    async fn recent_tasks(&self, limit: usize) -> Result<Vec<TaskRecord>, FetchError> {
        self.list_tasks(limit).await
    }
}

#[cfg(test)]
#[path = "bitrix_tests.rs"]
mod tests;
