mod app;
mod config;
mod connectivity;
mod error;
mod gesture;
mod hardware;
mod hooks;
mod inference;
mod messages;
mod pipeline;
mod printer;
mod receipt;
mod services;
mod text_wrap;

#[cfg(test)]
mod testing;

use app::App;
use config::Config;
use hardware::{LedIndicator, StatusIndicator};

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting poetry camera");

    let config = Config::load()?;
    config.validate()?;

    let indicator: Arc<dyn StatusIndicator> = Arc::new(LedIndicator::new(&config.led_path));

    match App::new(config, indicator.clone()).await {
        Ok(app) => app.run().await,
        Err(e) => app::halt(indicator, e).await,
    }
}
