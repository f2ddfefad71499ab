//! Drivebridge Server
//!
//! Backend token exchange endpoint for drivebridge clients running inside a
//! host application.
//!
//! # Running
//!
//! ```bash
//! AZURE_CLIENT_ID=... AZURE_CLIENT_SECRET=... AZURE_TENANT_ID=... \
//!     cargo run -p drivebridge-server
//! ```

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use drivebridge_server::{ApiState, ServerConfig, load_config, start_server};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting drivebridge server...");

    let config = load_config()?;
    info!("Loaded configuration from {:?}", config.config_path);

    run_server(config).await
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let state = ApiState::from_config(&config)?;
    let handle = start_server(config.bind_addr, state).await?;

    info!("Listening on http://{}. Press Ctrl+C to stop.", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    handle.stop().await?;

    info!("Server stopped");
    Ok(())
}
