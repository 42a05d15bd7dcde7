//! # Bitrix Relay Service
//!
//! Binary entry point for the Bitrix Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes logging
//! - Builds the Bitrix24, Telegram, and language model clients
//! - Starts the command bot and the HTTP server from bitrix-relay-api

use anyhow::Context;
use bitrix_relay_api::{
    start_server, AppState, BitrixClient, CommandBot, LoggingConfig, OpenAiClient, ServiceConfig,
    ServiceError, TelegramClient,
};
use bitrix_relay_core::{ChatDestination, MessageComposer, NotificationTemplates, WebhookRelay};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "bitrix-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays Bitrix24 task webhooks to Telegram")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "RELAY_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Do not start the chat-command bot (no language model key needed)
    #[arg(long)]
    no_bot: bool,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging settings come from the configuration, so load it first and
    // report a failure once the subscriber is up.
    let loaded = ServiceConfig::load(args.config.as_deref(), std::env::vars());
    let mut logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    logging.json_format |= args.json_logs;
    init_tracing(&logging);

    info!("Starting Bitrix Relay Service");

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    if args.no_bot {
        config.assistant.enabled = false;
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let (state, bot) = match build_components(&config) {
        Ok(components) => components,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialize service; aborting");
            std::process::exit(3);
        }
    };

    if let Some(bot) = bot {
        tokio::spawn(bot.run());
    } else {
        info!("Command bot disabled");
    }

    info!(
        host = %config.server.host,
        port = config.server.port,
        chat_id = %config.telegram.chat_id,
        thread_id = ?config.telegram.thread_id,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(state).await {
        error!(error = %e, "Server stopped with an error");

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }
}

/// Initialize the global subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (json_layer, text_layer) = if logging.json_format {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Build the HTTP state and, unless disabled, the command bot.
fn build_components(config: &ServiceConfig) -> anyhow::Result<(AppState, Option<CommandBot>)> {
    let templates = match &config.templates.file {
        Some(path) => {
            info!(path = %path.display(), "Loading notification templates");
            NotificationTemplates::from_yaml_file(path)
                .context("failed to load notification templates")?
        }
        None => NotificationTemplates::default(),
    };

    let portal_url = config
        .bitrix
        .portal_url()
        .context("failed to determine the Bitrix24 portal URL")?;

    let bitrix = Arc::new(
        BitrixClient::new(&config.bitrix).context("failed to build Bitrix24 client")?,
    );
    let telegram = Arc::new(
        TelegramClient::new(&config.telegram).context("failed to build Telegram client")?,
    );

    let relay = WebhookRelay::new(
        bitrix.clone(),
        telegram.clone(),
        MessageComposer::new(Arc::new(templates), portal_url),
        ChatDestination::new(config.telegram.chat_id.clone(), config.telegram.thread_id),
    );
    let state = AppState::new(config.server.clone(), Arc::new(relay));

    if !config.assistant.enabled {
        return Ok((state, None));
    }

    let model = OpenAiClient::new(&config.assistant)
        .context("failed to build language model client")?;
    let bot = CommandBot::new(
        telegram,
        bitrix,
        Arc::new(model),
        config.assistant.poll_timeout_seconds,
    );

    Ok((state, Some(bot)))
}
