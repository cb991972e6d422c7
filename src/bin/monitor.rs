//! Monitoring server binary.
//!
//! Takes no arguments; configuration comes from the optional YAML file
//! named by `BASESTATION_CONFIG`. Exits non-zero on any fatal condition,
//! including the idle timeout.

use anyhow::Context;
use basestation::{Config, MonitorServer};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let mut server = MonitorServer::bind(&config).context("starting the monitor server")?;

    server.run().await.context("monitor server terminated")?;
    Ok(())
}
