mod admin;
mod bootstrap;
mod health;
mod orchestrator;
mod vapi;

use anyhow::Result;
use saathi_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use saathi_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        webhook_secret_configured = app.vapi_state.webhook_secret.is_some(),
        kb_url = %app.config.kb.url,
        "saathi-server listening"
    );

    axum::serve(listener, app.router()).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "saathi-server stopping");
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    // Serve until interrupted; an error installing the handler would hang
    // shutdown, so treat it as an immediate stop signal.
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!(event_name = "system.server.signal_error", "ctrl-c handler unavailable");
    }
}
