use crate::bot::auth::{AuthState, PasswordOutcome, StartOutcome};
use crate::bot::jobs::{JobGuard, JobId, JobKind};
use crate::bot::progress::{spawn_progress_updates, ProgressTarget};
use crate::bot::resilient::{
    delete_message_quietly, download_document, edit_or_send, fit_message,
    send_document_file, send_text,
};
use crate::bot::spreadsheet::{inspect_off_thread, is_accepted_filename};
use crate::bot::state::BotState;
use crate::bot::views;
use anyhow::Result;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use teloxide::{prelude::*, utils::command::BotCommands};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Safe extraction of user ID from a message.
/// Returns `None` for messages without a sender, such as channel posts.
#[must_use]
pub fn get_user_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|u| u.id.0.cast_signed())
}

fn sender_or_ignore(msg: &Message) -> Option<i64> {
    let user_id = get_user_id(msg);
    if user_id.is_none() {
        debug!("Ignoring message {} without a sender", msg.id.0);
    }
    user_id
}

fn job_id(msg: &Message) -> JobId {
    JobId {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    }
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Authenticate, or show usage when already authenticated
    #[command(description = "Start the bot and authenticate.")]
    Start,
    /// Show text and spreadsheet jobs
    #[command(description = "Show the status of your requests.")]
    Status,
}

/// Handler for the /start command
///
/// # Errors
///
/// Returns an error if the reply could not be sent.
pub async fn start(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let Some(user_id) = sender_or_ignore(&msg) else {
        return Ok(());
    };
    let reply = match state.auth.start(user_id) {
        StartOutcome::AlreadyAuthenticated => views::already_authenticated(state.max_questions()),
        StartOutcome::PasswordRequested => {
            info!("User {user_id} asked to authenticate");
            views::PASSWORD_PROMPT.to_string()
        }
    };
    send_text(&bot, msg.chat.id, reply).await?;
    Ok(())
}

/// Handler for the /status command
///
/// # Errors
///
/// Returns an error if the reply could not be sent.
pub async fn status(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let report = views::render_status(&state.jobs.snapshot(), Utc::now());
    send_text(&bot, msg.chat.id, fit_message(&report)).await?;
    Ok(())
}

/// Handler for free text: password entry or a question to relay
///
/// # Errors
///
/// Returns an error if a reply could not be sent.
pub async fn handle_text(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user_id) = sender_or_ignore(&msg) else {
        return Ok(());
    };

    match state.auth.state(user_id) {
        AuthState::AwaitingPassword => {
            let reply = match state.auth.submit_password(user_id, text) {
                PasswordOutcome::Accepted => {
                    debug!("{} user(s) authenticated", state.auth.authenticated_count());
                    views::authentication_succeeded(state.max_questions())
                }
                PasswordOutcome::Rejected => views::WRONG_PASSWORD.to_string(),
                PasswordOutcome::NotRequested => views::NOT_AUTHENTICATED_TEXT.to_string(),
            };
            send_text(&bot, msg.chat.id, reply).await?;
        }
        AuthState::Authenticated => {
            let id = job_id(&msg);
            info!("Text request {id} from user {user_id}");
            let guard = state.jobs.begin(id, JobKind::Text);
            let question = text.to_string();
            let chat_id = msg.chat.id;
            let job_state = Arc::clone(&state);
            state.jobs.spawn(id, async move {
                if let Err(e) = run_text_job(&bot, chat_id, guard, &question, &job_state).await {
                    error!("Text job {id} failed: {e}");
                    let _ = send_text(&bot, chat_id, views::text_failed(id, &e.to_string())).await;
                }
            });
        }
        AuthState::Unauthenticated => {
            send_text(&bot, msg.chat.id, views::NOT_AUTHENTICATED_TEXT).await?;
        }
    }
    Ok(())
}

async fn run_text_job(
    bot: &Bot,
    chat_id: ChatId,
    guard: JobGuard,
    question: &str,
    state: &BotState,
) -> Result<()> {
    let id = guard.id();
    let ack = send_text(bot, chat_id, views::text_processing(id)).await?;

    let answer = state.relay_text(question).await;
    let delivered = edit_or_send(bot, chat_id, ack.id, &views::text_response(id, &answer)).await;

    drop(guard);
    delivered?;
    debug!("Text job {id} completed");
    Ok(())
}

/// Handler for document uploads
///
/// Validates the spreadsheet before anything is relayed, replies with an
/// estimate and schedules the relay as a background job.
///
/// # Errors
///
/// Returns an error if a reply could not be sent.
pub async fn handle_document(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let Some(document) = msg.document() else {
        return Ok(());
    };
    let Some(user_id) = sender_or_ignore(&msg) else {
        return Ok(());
    };

    if !state.auth.is_authenticated(user_id) {
        send_text(&bot, msg.chat.id, views::NOT_AUTHENTICATED_FILE).await?;
        return Ok(());
    }

    let filename = document.file_name.clone().unwrap_or_default();
    if !is_accepted_filename(&filename) {
        debug!("Ignoring document {filename:?} from user {user_id}");
        return Ok(());
    }
    info!("Received file {filename} from user {user_id}");

    let file = match download_document(&bot, document).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Failed to download {filename}: {e}");
            send_text(&bot, msg.chat.id, views::download_failed(&e.to_string())).await?;
            return Ok(());
        }
    };

    let inspected = inspect_off_thread(file.clone(), filename.clone(), state.max_questions()).await;
    let upload = match inspected {
        Ok(upload) => upload,
        Err(e) => {
            warn!("Rejected {filename} from user {user_id}: {e}");
            send_text(&bot, msg.chat.id, views::spreadsheet_rejected(&e)).await?;
            return Ok(());
        }
    };

    send_text(&bot, msg.chat.id, views::spreadsheet_received(&filename, &upload)).await?;

    let id = job_id(&msg);
    let guard = state.jobs.begin(
        id,
        JobKind::Spreadsheet {
            filename: filename.clone(),
        },
    );
    let chat_id = msg.chat.id;
    let job_state = Arc::clone(&state);
    state.jobs.spawn(id, async move {
        if let Err(e) = run_spreadsheet_job(&bot, chat_id, guard, file, &filename, &job_state).await
        {
            error!("Spreadsheet job {id} failed: {e}");
            let _ = send_text(
                &bot,
                chat_id,
                views::spreadsheet_failed(&filename, &e.to_string()),
            )
            .await;
        }
    });
    Ok(())
}

async fn run_spreadsheet_job(
    bot: &Bot,
    chat_id: ChatId,
    guard: JobGuard,
    file: Bytes,
    filename: &str,
    state: &BotState,
) -> Result<()> {
    let id = guard.id();
    let status_msg = send_text(bot, chat_id, views::spreadsheet_processing(filename, id)).await?;

    let cancel = CancellationToken::new();
    let progress = state.settings.progress_updates.then(|| {
        spawn_progress_updates(
            bot.clone(),
            Arc::clone(&state.jobs),
            ProgressTarget {
                chat_id,
                message_id: status_msg.id,
                job: id,
                filename: filename.to_string(),
            },
            Duration::from_secs(state.settings.progress_interval_secs),
            cancel.clone(),
        )
    });

    let result = state.relay_spreadsheet(file, filename).await;
    cancel.cancel();
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    let outcome = match result {
        Some(document) => {
            match send_document_file(
                bot,
                chat_id,
                document,
                &views::processed_filename(filename),
                &views::spreadsheet_done(id),
            )
            .await
            {
                Ok(_) => {
                    delete_message_quietly(bot, chat_id, status_msg.id).await;
                    info!("Spreadsheet job {id} delivered {filename}");
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to deliver result of {id}: {e}");
                    let notice = views::spreadsheet_failed(filename, &e.to_string());
                    edit_or_send(bot, chat_id, status_msg.id, &notice).await
                }
            }
        }
        None => {
            let notice = views::spreadsheet_no_result(filename);
            edit_or_send(bot, chat_id, status_msg.id, &notice).await
        }
    };

    drop(guard);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start", "rfp_bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/status", "rfp_bot").ok(), Some(Command::Status));
        assert_eq!(
            Command::parse("/status@rfp_bot", "rfp_bot").ok(),
            Some(Command::Status)
        );
        assert!(Command::parse("/clear", "rfp_bot").is_err());
    }

    #[test]
    fn test_command_descriptions_list_both_commands() {
        let help = Command::descriptions().to_string();
        assert!(help.contains("/start"));
        assert!(help.contains("/status"));
    }

    #[test]
    fn test_channel_post_has_no_user_id() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": 7,
            "date": 1_735_992_000,
            "chat": { "id": -100_123_456, "type": "channel", "title": "Announcements" },
            "text": "hello"
        }))
        .expect("channel post json");
        assert_eq!(get_user_id(&msg), None);
    }
}
