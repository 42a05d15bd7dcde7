//! # Language Model Client
//!
//! Minimal client for OpenAI-compatible `chat/completions` endpoints, used
//! by the command bot to answer free-text messages.

use crate::config::AssistantConfig;
use crate::errors::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Errors from the language model API
#[derive(Debug, thiserror::Error)]
pub enum LanguageModelError {
    #[error("Language model API unreachable: {message}")]
    Transport { message: String },

    #[error("Language model API returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Invalid language model response: {message}")]
    InvalidResponse { message: String },

    #[error("Language model returned no answer")]
    EmptyAnswer,
}

/// Answers a single user question.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, LanguageModelError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completion client
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_url", &self.api_url)
            .field("api_key", &"<REDACTED>")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: &AssistantConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    async fn ask(&self, question: &str) -> Result<String, LanguageModelError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LanguageModelError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(LanguageModelError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| LanguageModelError::InvalidResponse {
                message: e.to_string(),
            })?;

        let answer = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LanguageModelError::EmptyAnswer)?;

        debug!(answer_len = answer.len(), "Language model answered");
        Ok(answer)
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
