use super::{QuestionRelay, RelayOutcome, MISSING_ANSWER};
use crate::config::{Settings, XLSX_MIME};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Serialize)]
struct QuestionBody<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct AnswerBody {
    answer: Option<String>,
}

/// Bearer-authenticated client for the text and spreadsheet endpoints
#[derive(Clone, Debug)]
pub struct RelayClient {
    http: HttpClient,
    text_url: String,
    excel_url: String,
    token: String,
}

impl RelayClient {
    /// Creates a client from settings.
    ///
    /// Relay calls have no timeout unless `RELAY_TIMEOUT_SECS` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = settings.relay_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            text_url: settings.text_endpoint(),
            excel_url: settings.excel_endpoint(),
            token: settings.hf_token.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn send(request: RequestBuilder) -> Result<Response, String> {
        request.send().await.map_err(|e| e.to_string())
    }

    /// Posts the question as JSON and falls back to a form body once on `422`.
    async fn post_question(&self, question: &str) -> Result<Response, String> {
        let body = QuestionBody { question };
        let response = Self::send(
            self.authorized(self.http.post(&self.text_url))
                .header(header::ACCEPT, "application/json")
                .json(&body),
        )
        .await?;

        if response.status() != StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(response);
        }

        debug!("Text endpoint rejected JSON body, retrying as form data");
        Self::send(
            self.authorized(self.http.post(&self.text_url))
                .header(header::ACCEPT, "application/json")
                .form(&body),
        )
        .await
    }
}

#[async_trait]
impl QuestionRelay for RelayClient {
    async fn ask(&self, question: &str) -> RelayOutcome<String> {
        let response = match self.post_question(question).await {
            Ok(response) => response,
            Err(cause) => {
                warn!("Text relay transport failure: {cause}");
                return RelayOutcome::TransportError(cause);
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Text relay returned status {status}");
            return RelayOutcome::StatusError(status);
        }

        match response.json::<AnswerBody>().await {
            Ok(body) => {
                RelayOutcome::Success(body.answer.unwrap_or_else(|| MISSING_ANSWER.to_string()))
            }
            Err(e) => RelayOutcome::TransportError(e.to_string()),
        }
    }

    async fn answer_spreadsheet(&self, file: Bytes, filename: &str) -> RelayOutcome<Bytes> {
        let part = match Part::stream(file)
            .file_name(filename.to_string())
            .mime_str(XLSX_MIME)
        {
            Ok(part) => part,
            Err(e) => return RelayOutcome::TransportError(e.to_string()),
        };

        let request = self
            .authorized(self.http.post(&self.excel_url))
            .header(header::ACCEPT, XLSX_MIME)
            .multipart(Form::new().part("file", part));

        let response = match Self::send(request).await {
            Ok(response) => response,
            Err(cause) => return RelayOutcome::TransportError(cause),
        };

        let status = response.status();
        if status != StatusCode::OK {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                "Excel API Error: {status} - {}",
                crate::utils::truncate_str(detail, 500)
            );
            return RelayOutcome::StatusError(status);
        }

        match response.bytes().await {
            Ok(bytes) => RelayOutcome::Success(bytes),
            Err(e) => RelayOutcome::TransportError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RelayClient {
        let mut settings = test_settings();
        settings.base_url = server.uri();
        RelayClient::new(&settings).expect("relay client")
    }

    #[tokio::test]
    async fn test_ask_returns_answer_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/questions/text"))
            .and(header("authorization", "Bearer hf_dummy"))
            .and(body_json(serde_json::json!({"question": "What is X?"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"answer": "X is..."})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server).ask("What is X?").await;
        assert_eq!(outcome, RelayOutcome::Success("X is...".to_string()));
    }

    #[tokio::test]
    async fn test_ask_retries_with_form_body_on_422() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/questions/text"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(422))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/questions/text"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("question=What+is+X%3F"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"answer": "X is..."})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server).ask("What is X?").await;
        assert_eq!(outcome.into_display_text(), "X is...");
    }

    #[tokio::test]
    async fn test_ask_reports_status_and_missing_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.ask("q").await.into_display_text(), "Error: 503");
        assert_eq!(client.ask("q").await.into_display_text(), MISSING_ANSWER);
    }

    #[tokio::test]
    async fn test_ask_transport_error_is_displayable() {
        let mut settings = test_settings();
        // Nothing listens on port 9 of the loopback interface
        settings.base_url = "http://127.0.0.1:9".to_string();
        let text = RelayClient::new(&settings)
            .expect("relay client")
            .ask("q")
            .await
            .into_display_text();
        assert!(text.starts_with("Connection error: "), "got {text}");
    }

    #[tokio::test]
    async fn test_answer_spreadsheet_returns_document_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/questions/excel"))
            .and(header("authorization", "Bearer hf_dummy"))
            .and(header("accept", XLSX_MIME))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04result".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .answer_spreadsheet(Bytes::from_static(b"question\nWhat?\n"), "rfp.csv")
            .await;
        assert_eq!(
            outcome.into_document(),
            Some(Bytes::from_static(b"PK\x03\x04result"))
        );
    }

    #[tokio::test]
    async fn test_answer_spreadsheet_non_200_has_no_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/questions/excel"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .answer_spreadsheet(Bytes::from_static(b"data"), "rfp.xlsx")
            .await;
        assert_eq!(
            outcome,
            RelayOutcome::StatusError(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[tokio::test]
    async fn test_configured_timeout_applies_to_relay_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"answer": "late"}))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut settings = test_settings();
        settings.base_url = server.uri();
        settings.relay_timeout_secs = Some(1);
        let client = RelayClient::new(&settings).expect("client with timeout");

        let outcome = client.ask("q").await;
        assert!(
            matches!(outcome, RelayOutcome::TransportError(_)),
            "got {outcome:?}"
        );
    }
}
