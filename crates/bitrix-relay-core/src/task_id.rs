//! # Task Identifier Extraction
//!
//! Finds the Bitrix24 task id in a normalized payload. Different senders put
//! it in different places, so several field conventions are checked in a
//! fixed priority order and the first one carrying a value is used.

use crate::payload::{scalar_to_string, InboundPayload};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Marker left behind when a webhook template variable was never filled in.
pub const PLACEHOLDER_MARKER: &str = "{{";

/// Prefix Bitrix24 business processes put in front of task document ids.
const DOCUMENT_ID_PREFIX: &str = "TASK_";

/// Identifier of a Bitrix24 task
///
/// Never empty and never contains [`PLACEHOLDER_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a task id with validation
    pub fn new(value: impl Into<String>) -> Result<Self, TaskIdError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(TaskIdError::Missing);
        }

        if value.contains(PLACEHOLDER_MARKER) {
            return Err(TaskIdError::UnresolvedPlaceholder { value });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reasons a payload yields no usable task id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskIdError {
    /// None of the known id fields is present.
    #[error("No task id found in payload")]
    Missing,

    /// An id field is present but still holds a template placeholder, which
    /// means the sender's webhook configuration was never filled in.
    #[error("Task id contains an unresolved template placeholder: {value}")]
    UnresolvedPlaceholder { value: String },
}

/// Field conventions that may carry the task id, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskIdField {
    Id,
    TaskId,
    NestedTaskId,
    DocumentId,
    EventFields,
}

impl TaskIdField {
    /// All conventions in the order they are checked
    pub const PRIORITY: [TaskIdField; 5] = [
        Self::Id,
        Self::TaskId,
        Self::NestedTaskId,
        Self::DocumentId,
        Self::EventFields,
    ];

    /// Get string representation for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::TaskId => "task_id",
            Self::NestedTaskId => "task.id",
            Self::DocumentId => "document_id[2]",
            Self::EventFields => "data[FIELDS_AFTER]",
        }
    }

    /// Keys and paths to try for this convention.
    ///
    /// Flat payloads (form, query) keep bracketed keys verbatim, while JSON
    /// payloads nest them, so both spellings are listed.
    fn lookups(&self) -> &'static [&'static str] {
        match self {
            Self::Id => &["id"],
            Self::TaskId => &["task_id"],
            Self::NestedTaskId => &["task.id", "task[id]"],
            Self::DocumentId => &["document_id[2]", "document_id.2"],
            // Comment events carry the comment id in `ID` and the task in `TASK_ID`.
            Self::EventFields => &[
                "data[FIELDS_AFTER][TASK_ID]",
                "data.FIELDS_AFTER.TASK_ID",
                "data[FIELDS_AFTER][ID]",
                "data.FIELDS_AFTER.ID",
            ],
        }
    }

    fn find_value(&self, payload: &InboundPayload) -> Option<String> {
        self.lookups().iter().find_map(|lookup| {
            payload
                .get(lookup)
                .or_else(|| {
                    if lookup.contains('.') {
                        payload.resolve_path(lookup)
                    } else {
                        None
                    }
                })
                .and_then(scalar_to_string)
        })
    }
}

impl fmt::Display for TaskIdField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the task id from a normalized payload.
///
/// The first convention in [`TaskIdField::PRIORITY`] holding a non-empty
/// string or integer is the candidate; later conventions are not consulted
/// even when the candidate turns out to be invalid.
pub fn extract_task_id(payload: &InboundPayload) -> Result<TaskId, TaskIdError> {
    let (field, raw) = TaskIdField::PRIORITY
        .iter()
        .find_map(|field| field.find_value(payload).map(|value| (*field, value)))
        .ok_or_else(|| {
            debug!(
                encoding = ?payload.encoding(),
                "Payload carries none of the known task id fields"
            );
            TaskIdError::Missing
        })?;

    let candidate = match field {
        TaskIdField::DocumentId => strip_document_prefix(&raw).to_string(),
        _ => raw,
    };

    TaskId::new(candidate).inspect_err(|e| {
        warn!(field = %field, error = %e, "Rejected task id candidate");
    })
}

fn strip_document_prefix(value: &str) -> &str {
    match value.get(..DOCUMENT_ID_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(DOCUMENT_ID_PREFIX) => {
            &value[DOCUMENT_ID_PREFIX.len()..]
        }
        _ => value,
    }
}

#[cfg(test)]
#[path = "task_id_tests.rs"]
mod tests;
