use anyhow::Result;
use selene::Config;
use selene::logging::init_logging;
use selene::setup::bootstrap;
use selene::shutdown::{ShutdownSignal, listen_for_shutdown_signals};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path as the only argument, default locations otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path, e))?,
        None => Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?,
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    info!("Selene {} starting up", env!("APP_VERSION"));

    let shutdown = ShutdownSignal::new();
    let runtime = match bootstrap(&config, shutdown.clone()).await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(anyhow::anyhow!("Startup failed: {}", e));
        }
    };

    if let Some(subject) = runtime.environment.sponsorship.subject() {
        info!("Sponsored by {}", subject);
    }

    let site_task = runtime.spawn_site(Duration::from_secs(config.interval), shutdown.clone());
    tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

    shutdown.wait().await;
    info!("Shutting down");

    if let Err(e) = site_task.await {
        error!("Site loop failed: {}", e);
    }
    Ok(())
}
