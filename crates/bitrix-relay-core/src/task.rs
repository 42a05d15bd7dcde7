//! # Task Records
//!
//! Read-only view of a Bitrix24 task and the [`TaskFetcher`] abstraction that
//! loads it.

use crate::payload::scalar_to_string;
use crate::task_id::TaskId;
use async_trait::async_trait;
use serde_json::Value;

/// The task attributes a notification is built from.
///
/// Text fields the tracker omitted are empty strings; genuinely optional
/// attributes are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub responsible_name: String,
    pub creator_name: String,
    pub creator_id: String,
    pub group_name: Option<String>,
    /// ISO-8601 timestamp exactly as the tracker returned it
    pub deadline: Option<String>,
}

impl TaskRecord {
    /// Build a record from a `tasks.task.get` / `tasks.task.list` task object.
    ///
    /// Returns `None` when the object carries no id. Bitrix24 returns
    /// camelCase keys with nested `responsible`, `creator`, and `group`
    /// objects; an unassigned group comes back as an empty array.
    pub fn from_api_value(task: &Value) -> Option<Self> {
        let id = text_at(task, &["id", "ID"])?;

        Some(Self {
            id,
            title: text_at(task, &["title", "TITLE"]).unwrap_or_default(),
            description: text_at(task, &["description", "DESCRIPTION"]),
            responsible_name: text_at(task, &["responsible.name", "responsibleName"])
                .unwrap_or_default(),
            creator_name: text_at(task, &["creator.name", "createdByName"]).unwrap_or_default(),
            creator_id: text_at(task, &["creator.id", "createdBy", "CREATED_BY"])
                .unwrap_or_default(),
            group_name: text_at(task, &["group.name", "groupName"]),
            deadline: text_at(task, &["deadline", "DEADLINE"]),
        })
    }
}

/// First non-empty scalar found at any of the dot-separated paths.
fn text_at(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.split('.')
            .try_fold(value, |current, key| current.get(key))
            .and_then(scalar_to_string)
    })
}

/// Errors while loading a task from the tracker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The tracker answered but the response held no usable task.
    #[error("Task {task_id} not found")]
    NotFound { task_id: String },

    /// The tracker answered with a non-success status.
    #[error("Task tracker returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Network failure or timeout before any response arrived.
    #[error("Task tracker unreachable: {message}")]
    Unreachable { message: String },
}

impl FetchError {
    /// Check if the tracker was reached but had no such task
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Loads task records from the task tracker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskFetcher: Send + Sync {
    /// Fetch a single task by id. One attempt, no retries.
    async fn fetch_task(&self, task_id: &TaskId) -> Result<TaskRecord, FetchError>;
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
