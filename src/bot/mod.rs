/// Password gate in front of the relay
pub mod auth;
/// Command, text and document handlers
pub mod handlers;
/// Job records and background task spawning
pub mod jobs;
/// Worker pools bounding relay calls
pub mod pool;
/// Optional progress edits for spreadsheet jobs
pub mod progress;
/// Telegram calls with graceful degradation
pub mod resilient;
/// Spreadsheet parsing and validation
pub mod spreadsheet;
/// Shared handler state
pub mod state;
/// User-facing texts
pub mod views;

pub use state::BotState;
