use dotenvy::dotenv;
use rfp_responder_bot::config::Settings;
use rfp_responder_bot::logging::init_logging;
use rfp_responder_bot::runner::{run_hosted, run_standalone};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Setup logging with redaction before anything can log a secret
    init_logging().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?;

    info!(
        "Starting RFP Responder Bot v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let settings = init_settings();

    let result = match settings.http_listen_addr.clone() {
        Some(addr) => run_hosted(settings, &addr).await,
        None => run_standalone(settings).await,
    };
    if let Err(e) = &result {
        error!("Bot terminated with error: {e:#}");
    }
    result.map_err(Into::into)
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s.log_presence();
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
