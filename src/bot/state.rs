use crate::bot::auth::AuthGate;
use crate::bot::jobs::JobTracker;
use crate::bot::pool::WorkerPools;
use crate::config::Settings;
use crate::relay::{QuestionRelay, RelayClient};
use bytes::Bytes;
use std::sync::Arc;

/// Shared state handed to every handler through the dispatcher
///
/// Holds the authentication gate, the job tracker, the worker pools and
/// the relay. Nothing in here survives a restart.
pub struct BotState {
    /// Loaded settings
    pub settings: Arc<Settings>,
    /// Authenticated and awaiting-password callers
    pub auth: AuthGate,
    /// Job records and background task handles
    pub jobs: Arc<JobTracker>,
    /// Pools bounding relay calls
    pub pools: WorkerPools,
    /// Downstream API
    pub relay: Arc<dyn QuestionRelay>,
}

impl BotState {
    /// Creates state talking to the real downstream API.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay HTTP client cannot be built.
    pub fn new(settings: Arc<Settings>) -> Result<Self, reqwest::Error> {
        let relay = Arc::new(RelayClient::new(&settings)?);
        Ok(Self::with_relay(settings, relay))
    }

    /// Creates state around any relay implementation.
    #[must_use]
    pub fn with_relay(settings: Arc<Settings>, relay: Arc<dyn QuestionRelay>) -> Self {
        Self {
            auth: AuthGate::new(settings.bot_secret_password.clone()),
            jobs: Arc::new(JobTracker::new(settings.job_history_limit)),
            pools: WorkerPools::new(&settings),
            relay,
            settings,
        }
    }

    /// Maximum questions accepted per spreadsheet.
    #[must_use]
    pub fn max_questions(&self) -> usize {
        self.settings.file_rfp_excel_count
    }

    /// Relays a question on the text pool and renders the outcome for the chat.
    pub async fn relay_text(&self, question: &str) -> String {
        self.pools
            .text
            .run(self.relay.ask(question))
            .await
            .into_display_text()
    }

    /// Relays a spreadsheet under the spreadsheet limiter and pool.
    ///
    /// Returns `None` when the endpoint produced no document.
    pub async fn relay_spreadsheet(&self, file: Bytes, filename: &str) -> Option<Bytes> {
        self.pools
            .run_spreadsheet(self.relay.answer_spreadsheet(file, filename))
            .await
            .into_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::jobs::{JobId, JobKind, JobStatus};
    use crate::config::test_settings;
    use crate::relay::RelayOutcome;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRelay {
        limiter_seen: AtomicUsize,
        state: std::sync::OnceLock<std::sync::Weak<BotState>>,
    }

    #[async_trait]
    impl QuestionRelay for FakeRelay {
        async fn ask(&self, question: &str) -> RelayOutcome<String> {
            if question == "down?" {
                RelayOutcome::StatusError(StatusCode::BAD_GATEWAY)
            } else {
                RelayOutcome::Success(format!("answer to {question}"))
            }
        }

        async fn answer_spreadsheet(&self, file: Bytes, filename: &str) -> RelayOutcome<Bytes> {
            if let Some(state) = self.state.get().and_then(std::sync::Weak::upgrade) {
                self.limiter_seen.store(
                    state.pools.spreadsheet_limiter.available(),
                    Ordering::SeqCst,
                );
            }
            if filename.ends_with(".csv") {
                RelayOutcome::Success(file)
            } else {
                RelayOutcome::TransportError("connection reset".to_string())
            }
        }
    }

    fn state_with_fake() -> (Arc<BotState>, Arc<FakeRelay>) {
        let relay = Arc::new(FakeRelay {
            limiter_seen: AtomicUsize::new(usize::MAX),
            state: std::sync::OnceLock::new(),
        });
        let state = Arc::new(BotState::with_relay(
            Arc::new(test_settings()),
            Arc::clone(&relay) as Arc<dyn QuestionRelay>,
        ));
        let _ = relay.state.set(Arc::downgrade(&state));
        (state, relay)
    }

    #[tokio::test]
    async fn test_relay_text_renders_outcomes() {
        let (state, _) = state_with_fake();
        assert_eq!(state.relay_text("What is X?").await, "answer to What is X?");
        assert_eq!(state.relay_text("down?").await, "Error: 502");
    }

    #[tokio::test]
    async fn test_spreadsheet_job_lifecycle() {
        let (state, relay) = state_with_fake();
        let id = JobId {
            chat_id: 7,
            message_id: 50,
        };

        let guard = state.jobs.begin(
            id,
            JobKind::Spreadsheet {
                filename: "rfp.csv".to_string(),
            },
        );
        assert_eq!(
            state.jobs.get(id).map(|r| r.status),
            Some(JobStatus::Processing)
        );

        let result = state
            .relay_spreadsheet(Bytes::from_static(b"question\nA?\n"), "rfp.csv")
            .await;
        drop(guard);

        assert_eq!(result, Some(Bytes::from_static(b"question\nA?\n")));
        assert_eq!(
            state.jobs.get(id).map(|r| r.status),
            Some(JobStatus::Completed)
        );
        // One of the ten limiter permits was held during the relay call
        assert_eq!(relay.limiter_seen.load(Ordering::SeqCst), 9);
        assert_eq!(state.pools.spreadsheet_limiter.available(), 10);
    }

    #[tokio::test]
    async fn test_failed_spreadsheet_relay_yields_no_result() {
        let (state, _) = state_with_fake();
        let result = state
            .relay_spreadsheet(Bytes::from_static(b"x"), "rfp.xlsx")
            .await;
        assert!(result.is_none());
    }
}
