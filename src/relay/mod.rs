//! Relay to the downstream question-answering API
//!
//! The bot never answers questions itself: text questions and spreadsheet
//! uploads are forwarded to two HTTP endpoints and their results are
//! passed back to the chat. Every call resolves to a [`RelayOutcome`],
//! so no transport or status failure crosses this boundary as an error.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

/// HTTP client for the downstream endpoints
pub mod client;

pub use client::RelayClient;

/// Answer used when a successful response carries no `answer` field
pub const MISSING_ANSWER: &str = "I didn't understand that.";

/// Result of a single relay call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome<T> {
    /// The endpoint answered with `200 OK`
    Success(T),
    /// The endpoint answered with any other status
    StatusError(StatusCode),
    /// The request never produced a usable response
    TransportError(String),
}

impl RelayOutcome<String> {
    /// Renders a text relay outcome as the message shown to the user.
    ///
    /// # Examples
    ///
    /// ```
    /// use rfp_responder_bot::relay::RelayOutcome;
    /// use reqwest::StatusCode;
    ///
    /// let failed: RelayOutcome<String> = RelayOutcome::StatusError(StatusCode::BAD_GATEWAY);
    /// assert_eq!(failed.into_display_text(), "Error: 502");
    /// ```
    #[must_use]
    pub fn into_display_text(self) -> String {
        match self {
            Self::Success(answer) => answer,
            Self::StatusError(status) => format!("Error: {}", status.as_u16()),
            Self::TransportError(cause) => format!("Connection error: {cause}"),
        }
    }
}

impl RelayOutcome<Bytes> {
    /// Collapses a spreadsheet outcome into the result file, logging why there is none.
    #[must_use]
    pub fn into_document(self) -> Option<Bytes> {
        match self {
            Self::Success(bytes) => Some(bytes),
            Self::StatusError(status) => {
                tracing::error!("Excel API Error: {status}");
                None
            }
            Self::TransportError(cause) => {
                tracing::error!("Excel processing error: {cause}");
                None
            }
        }
    }
}

/// Downstream operations the bot depends on
#[async_trait]
pub trait QuestionRelay: Send + Sync {
    /// Asks a single question and returns the answer text.
    async fn ask(&self, question: &str) -> RelayOutcome<String>;

    /// Uploads a spreadsheet of questions and returns the answered document.
    async fn answer_spreadsheet(&self, file: Bytes, filename: &str) -> RelayOutcome<Bytes>;
}
