//! askloop - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the agent API.

use askloop::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "askloop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, browser={}",
        config.default_model,
        config
            .browser
            .map(|b| b.to_string())
            .unwrap_or_else(|| "Headless".to_string())
    );

    api::serve(config).await?;

    Ok(())
}
