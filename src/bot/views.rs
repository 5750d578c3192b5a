//! User-facing texts
//!
//! Keeping every reply here makes the handlers read as control flow and
//! lets the wording be tested without a Telegram connection.

use crate::bot::jobs::{JobId, JobSnapshot};
use crate::bot::spreadsheet::{SpreadsheetError, ValidatedUpload};
use crate::utils::{format_hours_minutes, format_seconds};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::time::Duration;

/// Header of the `/status` report
pub const STATUS_HEADER: &str = "Current Status:\n\n";
/// Body of the `/status` report when nothing was ever tracked
pub const NO_ACTIVE_PROCESSES: &str = "No active processes";

/// Prompt sent after `/start` to unauthenticated callers
pub const PASSWORD_PROMPT: &str = "🔑 Please enter the secret password to access the bot.";
/// Reply to a wrong password
pub const WRONG_PASSWORD: &str = "❌ Wrong password. Try again.";
/// Reply to text from callers outside the flow
pub const NOT_AUTHENTICATED_TEXT: &str =
    "❌ You are not authenticated. Please type /start to authenticate and then enter the password.";
/// Reply to uploads from callers outside the flow
pub const NOT_AUTHENTICATED_FILE: &str =
    "❌ You are not authenticated.\nPlease type /start to authenticate and enter the password first.";

fn usage(max_questions: usize) -> String {
    format!(
        "You can:\n\
         1. Send me any question as text\n\
         2. Send me an Excel file with questions (must have a 'question' column in 'rfp' sheet)\n\n\
         Note: Excel files must contain no more than {max_questions} questions.\n\n\
         Type /status to check the status of your requests."
    )
}

/// Reply to `/start` from an authenticated caller.
#[must_use]
pub fn already_authenticated(max_questions: usize) -> String {
    format!("✅ You are already authenticated!\n\n{}", usage(max_questions))
}

/// Reply to the correct password.
#[must_use]
pub fn authentication_succeeded(max_questions: usize) -> String {
    format!("✅ Authentication successful!\n\n{}", usage(max_questions))
}

/// Acknowledgment of a text question.
#[must_use]
pub fn text_processing(id: JobId) -> String {
    format!("🤔 Processing your request...\nRequest ID: {id}")
}

/// Final text answer.
#[must_use]
pub fn text_response(id: JobId, answer: &str) -> String {
    format!("✅ Response for {id}:\n{answer}")
}

/// Failure while handling a text question.
#[must_use]
pub fn text_failed(id: JobId, error: &str) -> String {
    format!("❌ Error processing request {id}: {error}")
}

/// Reply to an upload that could not be read or validated.
#[must_use]
pub fn spreadsheet_rejected(error: &SpreadsheetError) -> String {
    match error {
        SpreadsheetError::Parse(cause) => format!(
            "❌ Error reading Excel file: {cause}\n\
             Please make sure the file has 'rfp' sheet with 'question' column."
        ),
        SpreadsheetError::Empty => "❌ Error: Excel file is empty.".to_string(),
        SpreadsheetError::MissingQuestionColumn { found } => format!(
            "❌ Error: Excel file does not have 'question' column.\n\
             Please make sure your Excel file has a column named 'question'.\n\
             Found columns: {}",
            found.join(", ")
        ),
        SpreadsheetError::TooManyQuestions { found, max } => format!(
            "❌ Error: Too many questions in Excel file!\n\
             Your file has {found} questions.\n\
             Maximum allowed is {max} questions.\n\
             Please reduce the number of questions and try again."
        ),
    }
}

/// Reply when the upload could not be fetched from Telegram.
#[must_use]
pub fn download_failed(error: &str) -> String {
    format!("❌ Error reading Excel file: {error}\n")
}

/// Immediate estimate for an accepted upload.
#[must_use]
pub fn spreadsheet_received(filename: &str, upload: &ValidatedUpload) -> String {
    format!(
        "📊 Excel file received!\n\
         File: {filename}\n\
         Number of questions: {}\n\
         Estimated processing time: {:.1} minutes\n\n\
         Starting processing...",
        upload.rows,
        upload.estimated_minutes()
    )
}

/// Status message sent when the background job starts.
#[must_use]
pub fn spreadsheet_processing(filename: &str, id: JobId) -> String {
    format!("⚙️ Processing Excel file...\nFile: {filename}\nRequest ID: {id}")
}

/// Periodic progress edit of the status message.
#[must_use]
pub fn spreadsheet_progress(filename: &str, id: JobId, elapsed: Duration, status: &str) -> String {
    format!(
        "{}\nTime elapsed: {}\nStatus: {status}",
        spreadsheet_processing(filename, id),
        format_hours_minutes(elapsed)
    )
}

/// Caption of the returned document.
#[must_use]
pub fn spreadsheet_done(id: JobId) -> String {
    format!("✅ Excel processing completed!\nRequest ID: {id}")
}

/// Edit used when the batch endpoint produced no result.
#[must_use]
pub fn spreadsheet_no_result(filename: &str) -> String {
    format!(
        "❌ Failed to process file\nFile: {filename}\nPlease check the file format and try again."
    )
}

/// Edit used when delivering the result failed.
#[must_use]
pub fn spreadsheet_failed(filename: &str, error: &str) -> String {
    format!("❌ Error processing file\nFile: {filename}\nError: {error}")
}

/// Name of the document sent back to the chat.
#[must_use]
pub fn processed_filename(original: &str) -> String {
    format!("processed_{original}")
}

/// Renders the `/status` report.
///
/// # Examples
///
/// ```
/// use rfp_responder_bot::bot::jobs::JobSnapshot;
/// use rfp_responder_bot::bot::views::render_status;
///
/// let report = render_status(&JobSnapshot::default(), chrono::Utc::now());
/// assert_eq!(report, "Current Status:\n\nNo active processes");
/// ```
#[must_use]
pub fn render_status(snapshot: &JobSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::from(STATUS_HEADER);

    if !snapshot.text.is_empty() {
        out.push_str("📝 Text Requests:\n");
        for record in &snapshot.text {
            let _ = write!(
                out,
                "Request {}:\n├─ Status: {}\n└─ Time: {}\n\n",
                record.id,
                record.status,
                format_seconds(record.elapsed(now))
            );
        }
    }

    if !snapshot.spreadsheets.is_empty() {
        out.push_str("📊 Excel Files:\n");
        for record in &snapshot.spreadsheets {
            let _ = write!(
                out,
                "File {}:\n├─ Name: {}\n├─ Status: {}\n└─ Time: {}\n\n",
                record.id,
                record.filename().unwrap_or_default(),
                record.status,
                format_seconds(record.elapsed(now))
            );
        }
    }

    if snapshot.is_empty() {
        out.push_str(NO_ACTIVE_PROCESSES);
    }
    out
}
