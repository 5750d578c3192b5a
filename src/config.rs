//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed constants of the relay bot.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub bot_token: String,
    /// Base URL of the downstream question-answering API
    pub base_url: String,
    /// Bearer token sent to the downstream API
    pub hf_token: String,
    /// Shared secret users must type after `/start`
    pub bot_secret_password: String,

    /// Maximum number of questions accepted in one spreadsheet
    #[serde(default = "default_max_questions")]
    pub file_rfp_excel_count: usize,

    /// Size of the pool running text relay calls
    #[serde(default = "default_text_workers")]
    pub text_workers: usize,
    /// Size of the pool running spreadsheet relay calls
    #[serde(default = "default_excel_workers")]
    pub excel_workers: usize,
    /// Maximum number of spreadsheet relay calls in flight
    #[serde(default = "default_excel_concurrency")]
    pub excel_concurrency: usize,

    /// Connect and request timeout for the Telegram transport
    #[serde(default = "default_telegram_timeout_secs")]
    pub telegram_timeout_secs: u64,
    /// Alternative Telegram Bot API base URL
    pub telegram_api_url: Option<String>,
    /// Timeout for relay calls; unset means no timeout
    pub relay_timeout_secs: Option<u64>,

    /// Periodically edit the spreadsheet status message while it is processed
    #[serde(default)]
    pub progress_updates: bool,
    /// Interval between progress edits
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Interval between heartbeat log lines
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Number of records kept per job table before completed ones are evicted
    #[serde(default = "default_job_history_limit")]
    pub job_history_limit: usize,

    /// When set, serve a liveness endpoint on this address and host the bot inside it
    pub http_listen_addr: Option<String>,
}

const fn default_max_questions() -> usize {
    DEFAULT_MAX_QUESTIONS
}

const fn default_text_workers() -> usize {
    5
}

const fn default_excel_workers() -> usize {
    10
}

const fn default_excel_concurrency() -> usize {
    10
}

const fn default_telegram_timeout_secs() -> u64 {
    30
}

const fn default_progress_interval_secs() -> u64 {
    300
}

const fn default_heartbeat_interval_secs() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}

const fn default_job_history_limit() -> usize {
    1000
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rfp_responder_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is empty.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // `APP__BOT_TOKEN=...` style overrides
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain env vars; UPPER_SNAKE_CASE maps onto snake_case keys
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that the required secrets are present and the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("BOT_TOKEN", &self.bot_token),
            ("BASE_URL", &self.base_url),
            ("HF_TOKEN", &self.hf_token),
            ("BOT_SECRET_PASSWORD", &self.bot_secret_password),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{name} must not be empty")));
            }
        }
        if self.text_workers == 0 || self.excel_workers == 0 || self.excel_concurrency == 0 {
            return Err(ConfigError::Message(
                "worker pool sizes must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 || self.progress_interval_secs == 0 {
            return Err(ConfigError::Message(
                "heartbeat and progress intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// URL of the single-question endpoint
    #[must_use]
    pub fn text_endpoint(&self) -> String {
        format!("{}/api/v1/questions/text", self.base_url.trim_end_matches('/'))
    }

    /// URL of the batch spreadsheet endpoint
    #[must_use]
    pub fn excel_endpoint(&self) -> String {
        format!("{}/api/v1/questions/excel", self.base_url.trim_end_matches('/'))
    }

    /// Timeout applied to Telegram API requests
    #[must_use]
    pub const fn telegram_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram_timeout_secs)
    }

    /// Timeout applied to relay requests, if any
    #[must_use]
    pub fn relay_timeout(&self) -> Option<Duration> {
        self.relay_timeout_secs.map(Duration::from_secs)
    }

    /// Logs which of the required values were loaded, without their contents
    pub fn log_presence(&self) {
        let loaded = |v: &str| if v.is_empty() { "no" } else { "yes" };
        tracing::info!("BOT_TOKEN loaded: {}", loaded(&self.bot_token));
        tracing::info!("BASE_URL loaded: {}", loaded(&self.base_url));
        tracing::info!("HF_TOKEN loaded: {}", loaded(&self.hf_token));
        tracing::info!(
            "BOT_SECRET_PASSWORD loaded: {}",
            loaded(&self.bot_secret_password)
        );
    }
}

/// Default cap on questions per spreadsheet
pub const DEFAULT_MAX_QUESTIONS: usize = 100;
/// Estimated downstream processing time per question
pub const SECONDS_PER_QUESTION: u64 = 30;
/// Sheet read from `.xlsx`/`.xls` uploads
pub const EXCEL_SHEET_NAME: &str = "rfp";
/// Column holding the questions (matched case-insensitively)
pub const QUESTION_COLUMN: &str = "question";
/// MIME type of spreadsheet uploads and results
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
/// Default heartbeat interval (5 minutes)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 300;

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        bot_token: "123456789:dummy".to_string(),
        base_url: "http://localhost:8000".to_string(),
        hf_token: "hf_dummy".to_string(),
        bot_secret_password: "open sesame".to_string(),
        file_rfp_excel_count: DEFAULT_MAX_QUESTIONS,
        text_workers: 5,
        excel_workers: 10,
        excel_concurrency: 10,
        telegram_timeout_secs: 30,
        telegram_api_url: None,
        relay_timeout_secs: None,
        progress_updates: false,
        progress_interval_secs: 300,
        heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
        job_history_limit: 1000,
        http_listen_addr: None,
    }
}
