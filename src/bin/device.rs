//! Device simulator binary.
//!
//! One process per device: `device <id>` with the id in the configured
//! range. Out-of-range or non-numeric ids exit non-zero before any
//! connection attempt.

use anyhow::Context;
use basestation::{Config, DeviceSimulator};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "device", about = "Simulated telemetry device")]
struct Cli {
    /// Device id, between 1 and the configured device cap.
    id: i64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    let mut device = DeviceSimulator::new(cli.id, &config)?;
    device.connect().await?;

    device.run().await.context("device terminated")?;
    Ok(())
}
