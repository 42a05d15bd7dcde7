//! # Chat-Command Assistant
//!
//! A small Telegram bot running next to the webhook server. It understands
//! `/start`, `/help`, and `/tasks [N]`, and forwards any other text to the
//! language model.
//!
//! Updates are fetched by long polling. Every reply is sent as Telegram
//! HTML, so all text that did not originate here is escaped first.

use crate::llm::LanguageModel;
use crate::telegram::{SendMessageRequest, TelegramClient, TelegramError};
use async_trait::async_trait;
use bitrix_relay_core::composer::{escape_html, format_deadline, truncate_chars, EMPTY_FIELD};
use bitrix_relay_core::{FetchError, TaskRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tasks listed by a bare `/tasks`
pub const DEFAULT_TASK_LIMIT: usize = 5;

/// Upper bound for `/tasks N`
pub const MAX_TASK_LIMIT: usize = 20;

/// Longest model answer relayed; Telegram rejects messages over 4096 characters
pub const MAX_ANSWER_CHARS: usize = 4000;

/// Pause after a failed poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

const HELP_TEXT: &str = "👋 Привет! Я помогаю следить за задачами Bitrix24.\n\n\
    <b>Команды:</b>\n\
    /tasks [N] — последние задачи (по умолчанию 5, максимум 20)\n\
    /help — эта справка\n\n\
    Любой другой текст я передам языковой модели.";

const NO_TASKS_TEXT: &str = "📭 Задач не найдено.";

const TASKS_UNAVAILABLE_TEXT: &str = "😔 Не удалось загрузить задачи из Bitrix24. Попробуйте позже.";

const ANSWER_UNAVAILABLE_TEXT: &str = "😔 Не получилось получить ответ. Попробуйте позже.";

// ============================================================================
// Commands
// ============================================================================

/// A parsed chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start` or `/help`
    Help,

    /// `/tasks [N]`
    Tasks { limit: usize },

    /// Any other slash command
    Unknown { command: String },

    /// Free text for the language model
    Ask { question: String },
}

impl BotCommand {
    /// Parse a message text; returns `None` for blank messages.
    ///
    /// A `@botname` suffix on the command is ignored, as Telegram appends it
    /// in group chats. The `/tasks` count defaults to [`DEFAULT_TASK_LIMIT`]
    /// when absent or unparseable and is clamped to `1..=MAX_TASK_LIMIT`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let Some(command_line) = text.strip_prefix('/') else {
            return Some(Self::Ask {
                question: text.to_string(),
            });
        };

        let mut parts = command_line.split_whitespace();
        let name = parts
            .next()
            .and_then(|word| word.split('@').next())
            .unwrap_or_default()
            .to_lowercase();

        let command = match name.as_str() {
            "start" | "help" => Self::Help,
            "tasks" => Self::Tasks {
                limit: parts
                    .next()
                    .and_then(|n| n.parse::<i64>().ok())
                    .map(|n| n.clamp(1, MAX_TASK_LIMIT as i64) as usize)
                    .unwrap_or(DEFAULT_TASK_LIMIT),
            },
            _ => Self::Unknown {
                command: format!("/{name}"),
            },
        };

        Some(command)
    }
}

/// Source of recent tasks for `/tasks`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskDirectory: Send + Sync {
    /// The most recent tasks, newest first, at most `limit` of them.
    async fn recent_tasks(&self, limit: usize) -> Result<Vec<TaskRecord>, FetchError>;
}

/// Errors that stop a polling round
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Polling for updates failed: {0}")]
    Polling(#[from] TelegramError),
}

// ============================================================================
// Bot
// ============================================================================

/// Long-polling command bot
pub struct CommandBot {
    telegram: Arc<TelegramClient>,
    tasks: Arc<dyn TaskDirectory>,
    model: Arc<dyn LanguageModel>,
    poll_timeout_seconds: u64,
    offset: Option<i64>,
}

impl CommandBot {
    pub fn new(
        telegram: Arc<TelegramClient>,
        tasks: Arc<dyn TaskDirectory>,
        model: Arc<dyn LanguageModel>,
        poll_timeout_seconds: u64,
    ) -> Self {
        Self {
            telegram,
            tasks,
            model,
            poll_timeout_seconds,
            offset: None,
        }
    }

    /// Offset of the next update to request
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Reply text for a message, or `None` when the message is blank.
    pub async fn handle_text(&self, text: &str) -> Option<String> {
        let command = BotCommand::parse(text)?;
        Some(self.reply_to(command).await)
    }

    /// Reply text for a parsed command. Failures become apology replies.
    pub async fn reply_to(&self, command: BotCommand) -> String {
        match command {
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::Tasks { limit } => match self.tasks.recent_tasks(limit).await {
                Ok(tasks) if tasks.is_empty() => NO_TASKS_TEXT.to_string(),
                Ok(tasks) => tasks
                    .iter()
                    .map(task_line)
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => {
                    warn!(error = %e, "Could not list tasks");
                    TASKS_UNAVAILABLE_TEXT.to_string()
                }
            },
            BotCommand::Unknown { command } => format!(
                "🤔 Неизвестная команда {}. Список команд: /help",
                escape_html(&command)
            ),
            BotCommand::Ask { question } => match self.model.ask(&question).await {
                Ok(answer) => escape_html(&truncate_chars(&answer, MAX_ANSWER_CHARS)),
                Err(e) => {
                    warn!(error = %e, "Language model request failed");
                    ANSWER_UNAVAILABLE_TEXT.to_string()
                }
            },
        }
    }

    /// Fetch one batch of updates and answer every text message in it.
    ///
    /// The offset advances past each update even when its reply fails, so a
    /// message is never answered twice. Returns the number of replies sent.
    #[instrument(skip(self), fields(offset = ?self.offset))]
    pub async fn poll_once(&mut self) -> Result<usize, BotError> {
        let updates = self
            .telegram
            .get_updates(self.offset, self.poll_timeout_seconds)
            .await?;

        let mut replied = 0;
        for update in updates {
            self.offset = Some(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            let Some(reply) = self.handle_text(text).await else {
                continue;
            };

            let request = SendMessageRequest::html(&message.reply_destination(), reply);
            match self.telegram.send_message(&request).await {
                Ok(()) => replied += 1,
                Err(e) => warn!(
                    chat_id = message.chat.id,
                    error = %e,
                    "Failed to send reply"
                ),
            }
        }

        debug!(replied, "Poll round finished");
        Ok(replied)
    }

    /// Poll until the task is dropped with the runtime.
    pub async fn run(mut self) {
        info!(
            poll_timeout_seconds = self.poll_timeout_seconds,
            "Command bot started"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, retry_in_seconds = POLL_RETRY_DELAY.as_secs(), "Polling failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }
}

/// One `/tasks` line: `#{id} {title} — {deadline}`.
fn task_line(task: &TaskRecord) -> String {
    let title = task.title.trim();
    let title = if title.is_empty() { EMPTY_FIELD } else { title };

    format!(
        "#{} {} — {}",
        escape_html(&task.id),
        escape_html(title),
        escape_html(&format_deadline(task.deadline.as_deref()))
    )
}

#[cfg(test)]
#[path = "assistant_tests.rs"]
mod tests;
