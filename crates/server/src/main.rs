mod bootstrap;
mod cleanup;
mod health;

use std::sync::Arc;

use anyhow::Result;
use slotbot_core::config::{AppConfig, LoadOptions};
use slotbot_core::SystemClock;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use slotbot_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
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

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState {
            instance_id: app.instance_id,
            throttle: app.throttle.clone(),
            store: app.store.clone(),
        },
    )
    .await?;

    let sweeper = cleanup::spawn(
        app.throttle.clone(),
        Arc::new(SystemClock),
        app.config.throttle.cleanup_interval(),
        app.config.throttle.stale_after(),
    );

    tracing::info!(
        event_name = "system.server.chat_transport_mode",
        transport_mode = "noop",
        correlation_id = "bootstrap",
        instance_id = %app.instance_id,
        "bot runner transport mode initialized"
    );

    app.bot_runner.start().await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        instance_id = %app.instance_id,
        "slotbot-server started"
    );
    wait_for_shutdown().await?;
    sweeper.abort();
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        instance_id = %app.instance_id,
        "slotbot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
