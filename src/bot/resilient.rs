//! Telegram API calls with graceful degradation.
//!
//! Every call is attempted once. Failures come back as errors, or for
//! edits as `false`, so the caller can tell the user.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Document, InputFile, Message, MessageId};
use tracing::{debug, warn};

/// Maximum message length with a safety margin under Telegram's 4096.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

const ERROR_NOT_MODIFIED: &str = "message is not modified";
const ERROR_NOT_FOUND: &str = "message to edit not found";

/// Send a plain-text message.
///
/// # Errors
///
/// Returns an error if Telegram rejected the message or was unreachable.
pub async fn send_text(bot: &Bot, chat_id: ChatId, text: impl Into<String>) -> Result<Message> {
    bot.send_message(chat_id, text.into())
        .await
        .map_err(|e| anyhow!("Telegram send error: {e}"))
}

/// Edit the text of a message.
///
/// # Errors
///
/// Returns an error if Telegram rejected the edit or was unreachable.
pub async fn edit_text(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
) -> Result<Message> {
    bot.edit_message_text(chat_id, msg_id, text.into())
        .await
        .map_err(|e| anyhow!("Telegram edit error: {e}"))
}

/// Edit message with graceful degradation.
///
/// Truncates the text to [`TELEGRAM_MESSAGE_LIMIT`] characters. "message
/// is not modified" counts as shown; any other failure is logged.
///
/// Returns `true` if the message now shows `text`.
pub async fn edit_text_safe(bot: &Bot, chat_id: ChatId, msg_id: MessageId, text: &str) -> bool {
    match edit_text(bot, chat_id, msg_id, fit_message(text)).await {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_MODIFIED) {
                debug!("Message update skipped: {err_msg}");
                true
            } else if err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
                false
            } else {
                warn!("Failed to edit message: {e}");
                false
            }
        }
    }
}

/// Replace a status message with `text`, or send `text` as a new message
/// when the status message can no longer be edited.
///
/// # Errors
///
/// Returns an error if neither the edit nor the new message went through.
pub async fn edit_or_send(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> Result<()> {
    if edit_text_safe(bot, chat_id, msg_id, text).await {
        return Ok(());
    }
    debug!("Sending update for message {} as a new message", msg_id.0);
    send_text(bot, chat_id, fit_message(text)).await?;
    Ok(())
}

/// Send an in-memory file as a document.
///
/// # Errors
///
/// Returns an error if Telegram rejected the document or was unreachable.
pub async fn send_document_file(
    bot: &Bot,
    chat_id: ChatId,
    contents: Bytes,
    filename: &str,
    caption: &str,
) -> Result<Message> {
    let file = InputFile::memory(contents.to_vec()).file_name(filename.to_string());
    bot.send_document(chat_id, file)
        .caption(caption)
        .await
        .map_err(|e| anyhow!("Telegram send document error: {e}"))
}

/// Download an uploaded document into memory.
///
/// # Errors
///
/// Returns an error if `getFile` or the file download failed.
pub async fn download_document(bot: &Bot, document: &Document) -> Result<Bytes> {
    let file = bot
        .get_file(document.file.id.clone())
        .await
        .map_err(|e| anyhow!("Telegram getFile error: {e}"))?;
    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| anyhow!("Telegram download error: {e}"))?;
    Ok(Bytes::from(buf))
}

/// Delete a message, logging instead of failing.
pub async fn delete_message_quietly(bot: &Bot, chat_id: ChatId, msg_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, msg_id).await {
        debug!("Could not delete message {}: {e}", msg_id.0);
    }
}

/// Truncates text to the Telegram limit, marking the cut.
#[must_use]
pub fn fit_message(text: &str) -> String {
    if text.chars().count() > TELEGRAM_MESSAGE_LIMIT {
        let truncated = crate::utils::truncate_str(text, TELEGRAM_MESSAGE_LIMIT);
        format!("{truncated}...\n\n(message truncated)")
    } else {
        text.to_string()
    }
}
