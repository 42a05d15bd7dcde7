//! # Message Composer
//!
//! Renders a [`TaskRecord`] into a Telegram HTML notification. Everything is
//! deterministic except the phrase selection, which draws from an injected
//! random number generator so tests can pin it down.

use crate::payload::InboundPayload;
use crate::task::TaskRecord;
use crate::templates::NotificationTemplates;
use chrono::{DateTime, NaiveDateTime};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Deadline text when the task has none
pub const DEADLINE_NOT_SPECIFIED: &str = "не указан";

/// Placeholder for absent optional fields
pub const EMPTY_FIELD: &str = "—";

/// Output format for parsed deadlines
const DEADLINE_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Offset-less timestamp layouts accepted after RFC 3339 fails
const NAIVE_DEADLINE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Descriptions longer than this are cut to keep under Telegram's message limit
const MAX_DESCRIPTION_CHARS: usize = 1000;

// ============================================================================
// Notification Kind
// ============================================================================

/// Lifecycle event a notification reports
///
/// Every kind shares the same body; only the header line differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotificationKind {
    #[default]
    NewTask,
    TaskUpdated,
    TaskCommented,
}

impl NotificationKind {
    /// Resolve the kind from a payload's `type` field or Bitrix24 `event` field.
    ///
    /// Unknown or absent values fall back to [`NotificationKind::NewTask`].
    pub fn from_payload(payload: &InboundPayload) -> Self {
        ["type", "event"]
            .iter()
            .filter_map(|key| payload.get_string(key))
            .find_map(|value| value.parse::<Self>().ok())
            .unwrap_or_default()
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewTask => "new_task",
            Self::TaskUpdated => "task_updated",
            Self::TaskCommented => "task_commented",
        }
    }

    fn header(&self) -> &'static str {
        match self {
            Self::NewTask => "🆕 <b>Новая задача</b>",
            Self::TaskUpdated => "✏️ <b>Задача обновлена</b>",
            Self::TaskCommented => "💬 <b>Новый комментарий к задаче</b>",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownNotificationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" | "new_task" | "add" | "ontaskadd" => Ok(Self::NewTask),
            "update" | "updated" | "task_updated" | "ontaskupdate" => Ok(Self::TaskUpdated),
            "comment" | "task_commented" | "ontaskcommentadd" => Ok(Self::TaskCommented),
            _ => Err(UnknownNotificationKind {
                value: s.to_string(),
            }),
        }
    }
}

/// Returned when a notification type string is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown notification kind: {value}")]
pub struct UnknownNotificationKind {
    pub value: String,
}

// ============================================================================
// Composer
// ============================================================================

/// Builds notification text from task records and template tables.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    templates: Arc<NotificationTemplates>,
    portal_url: String,
}

impl MessageComposer {
    /// Create a composer.
    ///
    /// `portal_url` is the Bitrix24 portal root used for task links, e.g.
    /// `https://example.bitrix24.ru`.
    pub fn new(templates: Arc<NotificationTemplates>, portal_url: impl Into<String>) -> Self {
        let portal_url = portal_url.into().trim_end_matches('/').to_string();
        Self {
            templates,
            portal_url,
        }
    }

    pub fn templates(&self) -> &NotificationTemplates {
        &self.templates
    }

    /// Compose a notification using the thread-local random generator.
    pub fn compose(&self, kind: NotificationKind, task: &TaskRecord) -> String {
        self.compose_with_rng(kind, task, &mut rand::rng())
    }

    /// Compose a notification drawing phrases from `rng`.
    pub fn compose_with_rng<R: Rng + ?Sized>(
        &self,
        kind: NotificationKind,
        task: &TaskRecord,
        rng: &mut R,
    ) -> String {
        let responsible = task.responsible_name.trim();
        let handle = if responsible.is_empty() {
            EMPTY_FIELD
        } else {
            self.templates.handle_for(responsible)
        };
        let flavor = choose(self.templates.phrases_for(responsible), rng);
        let closing = choose(&self.templates.closing_phrases, rng);

        let description = truncate_chars(
            task.description.as_deref().unwrap_or_default(),
            MAX_DESCRIPTION_CHARS,
        );

        [
            format!("{}, {}", escape_html(handle), flavor),
            String::new(),
            kind.header().to_string(),
            format!("🆔 <b>ID:</b> {}", escape_html(&task.id)),
            format!("📌 <b>Задача:</b> {}", or_dash(&task.title)),
            format!("📝 <b>Описание:</b> {}", or_dash(&description)),
            format!("👤 <b>Ответственный:</b> {}", or_dash(responsible)),
            format!("✍️ <b>Постановщик:</b> {}", or_dash(&task.creator_name)),
            format!(
                "📁 <b>Проект:</b> {}",
                or_dash(task.group_name.as_deref().unwrap_or_default())
            ),
            format!(
                "⏰ <b>Дедлайн:</b> {}",
                escape_html(&format_deadline(task.deadline.as_deref()))
            ),
            String::new(),
            format!(
                "🔗 <a href=\"{}\">Открыть задачу</a>",
                escape_html(&self.task_url(task))
            ),
            String::new(),
            closing.to_string(),
        ]
        .join("\n")
    }

    /// Link to the task page in the Bitrix24 portal.
    pub fn task_url(&self, task: &TaskRecord) -> String {
        format!(
            "{}/company/personal/user/{}/tasks/task/view/{}/",
            self.portal_url, task.creator_id, task.id
        )
    }
}

fn choose<'a, R: Rng + ?Sized>(pool: &'a [String], rng: &mut R) -> &'a str {
    pool.choose(rng).map(String::as_str).unwrap_or_default()
}

fn or_dash(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        escape_html(text)
    }
}

/// Keep the first `max_chars` characters of `text`, appending `…` when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Format a tracker deadline as `DD.MM.YYYY HH:MM`.
///
/// RFC 3339 timestamps keep their own offset, so the wall-clock time is what
/// the tracker showed. Unparseable input is returned unchanged and an absent
/// or blank deadline becomes [`DEADLINE_NOT_SPECIFIED`].
pub fn format_deadline(deadline: Option<&str>) -> String {
    let Some(raw) = deadline.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEADLINE_NOT_SPECIFIED.to_string();
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format(DEADLINE_FORMAT).to_string();
    }

    NAIVE_DEADLINE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|parsed| parsed.format(DEADLINE_FORMAT).to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
#[path = "composer_tests.rs"]
mod tests;
