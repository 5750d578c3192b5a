//! Bot lifecycle: building the bot, wiring the dispatcher and hosting it
//!
//! The bot either runs standalone with its own heartbeat until Ctrl-C, or
//! inside an axum server that exposes a liveness endpoint and owns the
//! startup and shutdown of polling.

use crate::bot::handlers::{self, Command};
use crate::bot::spreadsheet::is_accepted_filename;
use crate::bot::BotState;
use crate::config::Settings;
use crate::server;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::{ShutdownToken, UpdateHandler};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Builds the Telegram client with transport timeouts and an optional API URL.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the API URL is invalid.
pub fn build_bot(settings: &Settings) -> Result<Bot> {
    let timeout = settings.telegram_timeout();
    let client = teloxide::net::default_reqwest_settings()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .context("Failed to build Telegram HTTP client")?;

    let bot = Bot::with_client(settings.bot_token.clone(), client);
    match settings.telegram_api_url.as_deref() {
        Some(url) => {
            let url = reqwest::Url::parse(url).context("Invalid TELEGRAM_API_URL")?;
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

fn is_plain_text(msg: &Message) -> bool {
    msg.text().is_some_and(|text| !text.starts_with('/'))
}

fn is_accepted_document(msg: &Message) -> bool {
    msg.document()
        .and_then(|doc| doc.file_name.as_deref())
        .is_some_and(is_accepted_filename)
}

/// Handler tree: commands, then plain text, then spreadsheet uploads.
#[must_use]
pub fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter(|msg: Message| is_plain_text(&msg)).endpoint(handle_text_message))
        .branch(
            dptree::filter(|msg: Message| is_accepted_document(&msg))
                .endpoint(handle_document_message),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg, state).await,
        Command::Status => handlers::status(bot, msg, state).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text_message(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_text(bot, msg, state).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_document_message(
    bot: Bot,
    msg: Message,
    state: Arc<BotState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_document(bot, msg, state).await {
        error!("Document handler error: {}", e);
    }
    respond(())
}

/// A running dispatcher and the state it serves
pub struct BotHost {
    state: Arc<BotState>,
    shutdown: ShutdownToken,
    polling: JoinHandle<()>,
}

impl BotHost {
    /// Builds the bot and starts long polling in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the Telegram or relay client cannot be built.
    pub fn start(settings: Arc<Settings>) -> Result<Self> {
        let bot = build_bot(&settings)?;
        let state =
            Arc::new(BotState::new(settings).context("Failed to build the relay HTTP client")?);
        Ok(Self::start_with(bot, state))
    }

    /// Starts polling for `bot` with the given state.
    #[must_use]
    pub fn start_with(bot: Bot, state: Arc<BotState>) -> Self {
        let mut dispatcher = Dispatcher::builder(bot, setup_handler())
            .dependencies(dptree::deps![Arc::clone(&state)])
            .default_handler(|upd| async move {
                debug!("Unhandled update: {:?}", upd.kind);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "Error in update handler",
            ))
            .build();

        let shutdown = dispatcher.shutdown_token();
        let polling = tokio::spawn(async move {
            dispatcher.dispatch().await;
            info!("Dispatcher stopped");
        });
        info!("Bot is running...");

        Self {
            state,
            shutdown,
            polling,
        }
    }

    /// Shared state served by the dispatcher.
    #[must_use]
    pub const fn state(&self) -> &Arc<BotState> {
        &self.state
    }

    /// Stops polling and waits for the dispatcher to finish.
    ///
    /// Background jobs already spawned are left to run to completion.
    pub async fn stop(self) {
        match self.shutdown.shutdown() {
            Ok(done) => {
                done.await;
                if let Err(e) = self.polling.await {
                    warn!("Polling task ended abnormally: {e}");
                }
            }
            Err(_) => {
                debug!("Dispatcher was idle, aborting polling task");
                self.polling.abort();
            }
        }
        info!(
            "Bot stopped, {} background job(s) still running",
            self.state.jobs.running_tasks()
        );
    }
}

/// Logs a liveness line every `interval` until cancelled.
///
/// Returns the number of heartbeats logged.
pub async fn heartbeat(interval: Duration, cancel: CancellationToken) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut beats = 0;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                beats += 1;
                info!("Bot heartbeat - Running...");
            }
        }
    }
    beats
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
    }
    info!("Shutdown signal received");
}

/// Runs the bot as a long-lived process until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the bot cannot be started.
pub async fn run_standalone(settings: Arc<Settings>) -> Result<()> {
    let interval = Duration::from_secs(settings.heartbeat_interval_secs);
    let host = BotHost::start(settings)?;

    let cancel = CancellationToken::new();
    let beats = tokio::spawn(heartbeat(interval, cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();
    if let Ok(count) = beats.await {
        debug!("Heartbeat stopped after {count} beat(s)");
    }
    host.stop().await;
    Ok(())
}

/// Serves the liveness endpoint on `addr` and hosts the bot inside it.
///
/// # Errors
///
/// Returns an error if the bot cannot be started, the address cannot be
/// bound or the server fails.
pub async fn run_hosted(settings: Arc<Settings>, addr: &str) -> Result<()> {
    let host = BotHost::start(settings)?;

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            host.stop().await;
            return Err(e).with_context(|| format!("Failed to bind {addr}"));
        }
    };
    info!("Liveness endpoint listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, server::router())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    host.stop().await;
    served.context("HTTP server failed")
}
