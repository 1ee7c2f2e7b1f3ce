//! Chat Relay - Main entry point.

use anyhow::Result;
use relay_common::config::{config_path, Config};
use relay_common::logging::{init_logging, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (file, then environment overrides). A bad override
    // aborts here, before the subscriber exists, so anyhow prints it.
    let config_file = config_path();
    let config = Config::load_with_env()?;

    let format = config
        .observability
        .log_format
        .parse::<LogFormat>()
        .unwrap_or_default();
    init_logging(&config.observability.log_level, format);

    if config_file.exists() {
        tracing::info!(path = %config_file.display(), "Loaded config file");
    } else {
        tracing::info!(path = %config_file.display(), "Config file not found, using defaults");
    }

    config.validate()?;

    tracing::info!("Chat Relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Effective configuration");

    relay_server::start_server(&config).await
}
