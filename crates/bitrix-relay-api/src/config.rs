//! Configuration types for the HTTP service
//!
//! Values are layered through the `config` crate, later sources overriding
//! earlier ones:
//!
//! 1. `/etc/bitrix-relay/service.yaml` (optional)
//! 2. `config/service.yaml` (optional)
//! 3. An explicit YAML file supplied by the operator (required when given)
//! 4. `RELAY__SECTION__KEY` environment variables, e.g.
//!    `RELAY__SERVER__PORT=9090`
//! 5. The flat variables older deployments use (`BOT_TOKEN`, `CHAT_ID`, ...)
//!
//! Every field has a default, so an unconfigured environment deserializes
//! cleanly; [`ServiceConfig::validate`] then rejects missing credentials.

use crate::errors::ConfigError;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// System-wide configuration file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/bitrix-relay/service.yaml";

/// Deployment-local configuration file, relative to the working directory
pub const LOCAL_CONFIG_FILE: &str = "config/service.yaml";

/// Prefix of namespaced environment variables
pub const ENV_PREFIX: &str = "RELAY";

/// Flat environment variables and the configuration keys they set.
///
/// Applied in order, so `BOT_TOKEN` wins over `TELEGRAM_TOKEN` when both are
/// present. Empty values are ignored.
const LEGACY_ENV_VARS: [(&str, &str); 7] = [
    ("TELEGRAM_TOKEN", "telegram.bot_token"),
    ("BOT_TOKEN", "telegram.bot_token"),
    ("CHAT_ID", "telegram.chat_id"),
    ("THREAD_ID", "telegram.thread_id"),
    ("BITRIX_WEBHOOK_URL", "bitrix.webhook_url"),
    ("OPENAI_API_KEY", "assistant.api_key"),
    ("PORT", "server.port"),
];

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Bitrix24 REST access
    pub bitrix: BitrixConfig,

    /// Telegram bot and notification destination
    pub telegram: TelegramConfig,

    /// Chat-command assistant and its language model
    pub assistant: AssistantConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Notification template source
    pub templates: TemplatesConfig,
}

impl ServiceConfig {
    /// Load configuration from the standard files, an optional explicit file,
    /// and the given environment.
    ///
    /// `env` is passed in rather than read from the process so tests can
    /// supply their own variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Loading`] when the explicit file is missing, a
    /// file is malformed, or a value cannot be coerced to its field type.
    pub fn load<I>(explicit_file: Option<&Path>, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = env.into_iter().collect();

        let mut builder = Config::builder()
            .add_source(File::new(SYSTEM_CONFIG_FILE, FileFormat::Yaml).required(false))
            .add_source(File::new(LOCAL_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(path) = explicit_file {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_ENV_VARS {
            let value = env
                .get(var)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            builder = builder.set_override_option(key, value)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Check that every value required at startup is present and usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("telegram.bot_token", &self.telegram.bot_token)?;
        require("telegram.chat_id", &self.telegram.chat_id)?;
        require("bitrix.webhook_url", &self.bitrix.webhook_url)?;

        parse_http_url("bitrix.webhook_url", &self.bitrix.webhook_url)?;
        parse_http_url("telegram.api_url", &self.telegram.api_url)?;

        if let Some(portal_url) = &self.bitrix.portal_url {
            parse_http_url("bitrix.portal_url", portal_url)?;
        }

        if self.bitrix.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "bitrix.timeout_seconds must be greater than zero".to_string(),
            });
        }

        if self.assistant.enabled {
            require("assistant.api_key", &self.assistant.api_key)?;
            parse_http_url("assistant.api_url", &self.assistant.api_url)?;
        }

        Ok(())
    }
}

fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn parse_http_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::Invalid {
        message: format!("{key} is not a valid URL: {e}"),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::Invalid {
            message: format!("{key} must use http or https, got '{scheme}'"),
        }),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Bitrix24 REST configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrixConfig {
    /// Inbound REST webhook URL, e.g. `https://portal.bitrix24.ru/rest/1/abc123/`
    ///
    /// The path carries the access token.
    pub webhook_url: String,

    /// Portal root used in task links; derived from `webhook_url` when unset
    pub portal_url: Option<String>,

    /// Timeout for each REST call, in seconds
    pub timeout_seconds: u64,
}

impl BitrixConfig {
    /// REST base URL with a guaranteed trailing slash.
    pub fn api_base_url(&self) -> String {
        let url = self.webhook_url.trim();
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        }
    }

    /// Portal root for task links, without a trailing slash.
    pub fn portal_url(&self) -> Result<String, ConfigError> {
        if let Some(portal_url) = self.portal_url.as_deref().map(str::trim) {
            if !portal_url.is_empty() {
                return Ok(portal_url.trim_end_matches('/').to_string());
            }
        }

        let url = parse_http_url("bitrix.webhook_url", &self.webhook_url)?;
        Ok(url.origin().ascii_serialization())
    }
}

impl Default for BitrixConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            portal_url: None,
            timeout_seconds: 10,
        }
    }
}

impl fmt::Debug for BitrixConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitrixConfig")
            .field("webhook_url", &"<REDACTED>")
            .field("portal_url", &self.portal_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Telegram configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token
    pub bot_token: String,

    /// Notification chat (numeric id or `@channel`)
    pub chat_id: String,

    /// Forum topic for notifications
    pub thread_id: Option<i64>,

    /// Bot API root
    pub api_url: String,

    /// Timeout for `sendMessage` calls, in seconds
    pub timeout_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            thread_id: None,
            api_url: "https://api.telegram.org".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .field("thread_id", &self.thread_id)
            .field("api_url", &self.api_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Chat-command assistant configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Run the command bot next to the webhook server
    pub enabled: bool,

    /// Language model API key
    pub api_key: String,

    /// OpenAI-compatible API root
    pub api_url: String,

    /// Chat model name
    pub model: String,

    /// System prompt sent ahead of every question
    pub system_prompt: String,

    /// Long-poll wait for `getUpdates`, in seconds
    pub poll_timeout_seconds: u64,

    /// Timeout for each language model call, in seconds
    pub request_timeout_seconds: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            api_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: "Ты дружелюбный помощник команды. Отвечай кратко и по делу на русском языке."
                .to_string(),
            poll_timeout_seconds: 30,
            request_timeout_seconds: 60,
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("poll_timeout_seconds", &self.poll_timeout_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Notification template source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TemplatesConfig {
    /// YAML file replacing the built-in template tables
    pub file: Option<PathBuf>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
