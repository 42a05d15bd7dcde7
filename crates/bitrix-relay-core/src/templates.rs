//! # Notification Templates
//!
//! Lookup tables the message composer draws from: Telegram handles per
//! display name, personalized flavor phrases, generic phrases, and closing
//! phrases. Built once at startup and shared read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Template tables for notification messages
///
/// Any table missing from a YAML document keeps its built-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationTemplates {
    /// Display name → Telegram handle (e.g. `@tinatinulya`)
    pub handles: HashMap<String, String>,

    /// Display name → phrases used instead of the generic ones
    pub personal_phrases: HashMap<String, Vec<String>>,

    /// Phrases for anyone without a personal list
    pub generic_phrases: Vec<String>,

    /// Sign-off lines appended after the task body
    pub closing_phrases: Vec<String>,
}

impl Default for NotificationTemplates {
    fn default() -> Self {
        let handles = HashMap::from([(
            "Кристина Нестерова".to_string(),
            "@tinatinulya".to_string(),
        )]);

        let personal_phrases = HashMap::from([(
            "Кристина Нестерова".to_string(),
            to_strings(&[
                "для тебя новая задача! ✨",
                "тут кое-что интересное подъехало 🚀",
                "без тебя никак, принимай задачу 💪",
            ]),
        )]);

        Self {
            handles,
            personal_phrases,
            generic_phrases: to_strings(&[
                "у вас новая задача! 📬",
                "прилетела свежая задача 🛬",
                "есть работа, принимайте 🧰",
                "задача ждёт вашего внимания 👀",
            ]),
            closing_phrases: to_strings(&[
                "Удачи! 🍀",
                "Всё получится! 💫",
                "Хорошего дня! ☀️",
                "Вперёд к результату! 🏁",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl NotificationTemplates {
    /// Load templates from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TemplateError> {
        let templates: Self = serde_yaml::from_str(yaml)?;
        templates.validate()?;
        Ok(templates)
    }

    /// Load templates from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, TemplateError> {
        let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Check that every table the composer draws from at random is usable.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.generic_phrases.is_empty() {
            return Err(TemplateError::Invalid {
                message: "generic_phrases must not be empty".to_string(),
            });
        }

        if self.closing_phrases.is_empty() {
            return Err(TemplateError::Invalid {
                message: "closing_phrases must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Telegram handle for a display name, or the name itself when unmapped.
    pub fn handle_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.handles
            .get(name.trim())
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Phrase pool for a display name.
    ///
    /// A non-empty personal list always wins; the generic list is used only
    /// when the name has none.
    pub fn phrases_for(&self, name: &str) -> &[String] {
        match self.personal_phrases.get(name.trim()) {
            Some(phrases) if !phrases.is_empty() => phrases,
            _ => &self.generic_phrases,
        }
    }
}

/// Errors while loading notification templates
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read templates file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Templates YAML parsing failed: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid templates: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
#[path = "templates_tests.rs"]
mod tests;
