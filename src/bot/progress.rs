//! Optional periodic progress edits for spreadsheet jobs
//!
//! Disabled unless `PROGRESS_UPDATES=true`. When enabled, the processing
//! message of a spreadsheet job is edited every interval with the time
//! elapsed so far, until the job completes or the updater is cancelled.

use crate::bot::jobs::{JobId, JobStatus, JobTracker};
use crate::bot::resilient::edit_text_safe;
use crate::bot::views;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where progress edits go
#[derive(Debug, Clone)]
pub struct ProgressTarget {
    /// Chat holding the processing message
    pub chat_id: ChatId,
    /// The processing message
    pub message_id: MessageId,
    /// Job being reported
    pub job: JobId,
    /// Uploaded file name
    pub filename: String,
}

/// Text for the next progress edit, or `None` once the job is gone or completed.
#[must_use]
pub fn progress_text(
    jobs: &JobTracker,
    target: &ProgressTarget,
    now: DateTime<Utc>,
) -> Option<String> {
    let record = jobs.get(target.job)?;
    if record.status == JobStatus::Completed {
        return None;
    }
    Some(views::spreadsheet_progress(
        &target.filename,
        target.job,
        record.elapsed(now),
        &record.status.to_string(),
    ))
}

/// Spawns the updater loop. Cancel `cancel` to stop it.
#[must_use]
pub fn spawn_progress_updates(
    bot: Bot,
    jobs: Arc<JobTracker>,
    target: ProgressTarget,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            let Some(text) = progress_text(&jobs, &target, Utc::now()) else {
                break;
            };
            edit_text_safe(&bot, target.chat_id, target.message_id, &text).await;
        }
        debug!("Progress updates for {} stopped", target.job);
    })
}
