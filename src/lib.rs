#![deny(missing_docs)]
//! RFP Responder Bot.
//!
//! Password-gated Telegram front end that relays text questions and
//! question spreadsheets to a downstream question-answering API.

/// Telegram handlers, authentication, jobs and spreadsheets.
pub mod bot;
/// Configuration management.
pub mod config;
/// Logging setup with secret redaction.
pub mod logging;
/// Downstream question-answering API client.
pub mod relay;
/// Bot lifecycle and hosting.
pub mod runner;
/// Liveness HTTP endpoint.
pub mod server;
/// Utility functions.
pub mod utils;
