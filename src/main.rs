//! PrismCast
//!
//! Captures live fMP4 byte streams produced by a headless-browser capture
//! and re-publishes each one as an HLS channel: rewritten decode timestamps,
//! versioned init segments, a sliding-window playlist, and an in-memory
//! segment store served over HTTP.

mod config;
mod config_file;
mod error;
mod http;
#[cfg(test)]
mod integration;
mod mp4;
mod pipeline;
mod state;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "prismcast";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        match crate::config_file::ConfigFile::from_file(&config_path) {
            Ok(cf) => cf.into_server_config(),
            Err(e) => {
                eprintln!(
                    "Failed to load config file {}: {}. Using defaults.",
                    config_path, e
                );
                ServerConfig::default()
            }
        }
    } else {
        ServerConfig::default()
    };

    // Initialize logging
    init_logging(&config.log_level);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("Configuration loaded: {:?}", config);

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));

    // Stream reaper: idle teardown plus the no-moov capture timeout
    let reaper_state = state.clone();
    let idle_timeout = Duration::from_secs(config.supervision.idle_timeout_secs);
    let no_moov_timeout = Duration::from_secs(config.supervision.no_moov_timeout_secs);
    let tick_period = no_moov_timeout.min(idle_timeout / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(tick_period);
        loop {
            tick.tick().await;
            let reaped = reaper_state.reap_idle(idle_timeout);
            if !reaped.is_empty() {
                tracing::info!(count = reaped.len(), "reaped idle streams");
            }
            reaper_state.reap_stalled(no_moov_timeout);
        }
    });

    // Create and serve the router
    let app = create_router(state);
    let addr = config.socket_addr();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize the tracing subscriber from the configured log level.
fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
