//! Logging setup with secret redaction
//!
//! Every line written by the subscriber passes through [`RedactingWriter`],
//! which masks Telegram bot tokens and downstream bearer tokens.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,teloxide=warn";
const DEBUG_FILTER: &str = "debug,hyper=warn,reqwest=warn";

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    token_prefixed: Regex,
    bearer: Regex,
    hf_token: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            bearer: Regex::new(r"(?i)(bearer\s+)[^\s,;]+")?,
            hf_token: Regex::new(r"hf_[A-Za-z0-9]{6,}")?,
        })
    }

    /// Masks every secret found in `input`.
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let output = self
            .token_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3");
        let output = self.token_bare.replace_all(&output, "[TELEGRAM_TOKEN]");
        let output = self
            .token_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]");
        let output = self.bearer.replace_all(&output, "$1[MASKED]");
        self.hf_token.replace_all(&output, "[HF_TOKEN]").into_owned()
    }
}

/// Writer that redacts secrets before forwarding to `inner`
pub struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    /// Wraps `inner`.
    pub const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The redacted length may differ, report the input as consumed.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` producing a [`RedactingWriter`] per event
pub struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    /// Wraps a writer factory such as `io::stderr`.
    pub const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

fn debug_mode() -> bool {
    std::env::var("DEBUG_MODE").is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Installs the global subscriber writing redacted lines to stderr.
///
/// `RUST_LOG` wins when set; otherwise `DEBUG_MODE=true` selects debug output.
///
/// # Errors
///
/// Returns an error if the redaction patterns fail to compile.
pub fn init_logging() -> Result<(), regex::Error> {
    let patterns = Arc::new(RedactionPatterns::new()?);
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let fallback = if debug_mode() { DEBUG_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedactionPatterns {
        RedactionPatterns::new().expect("patterns compile")
    }

    #[test]
    fn test_redacts_telegram_token_in_url() {
        let line = "GET https://api.telegram.org/bot123456789:AAF-abcdefghijklmnopqrstuvwxyz_012345/getUpdates";
        let redacted = patterns().redact(line);
        assert!(!redacted.contains("AAF-abc"));
        assert!(redacted.contains("/bot[TELEGRAM_TOKEN]/getUpdates"));
    }

    #[test]
    fn test_redacts_bearer_and_hf_tokens() {
        let redacted = patterns().redact("authorization: Bearer hf_AbCdEf123456 sent");
        assert_eq!(redacted, "authorization: Bearer [MASKED] sent");

        let redacted = patterns().redact("token=hf_AbCdEf123456");
        assert_eq!(redacted, "token=[HF_TOKEN]");
    }

    #[test]
    fn test_writer_reports_full_length() {
        let mut out = Vec::new();
        let mut writer = RedactingWriter::new(&mut out, Arc::new(patterns()));
        let input = b"Bearer secret-value";
        assert_eq!(writer.write(input).expect("write"), input.len());
        drop(writer);
        assert_eq!(String::from_utf8(out).expect("utf8"), "Bearer [MASKED]");
    }
}
