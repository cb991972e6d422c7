//! Minimal remote-device telemetry monitoring over TCP.
//!
//! A fleet of simulated devices each hold one long-lived stream to a
//! single monitoring server, push a fixed-layout telemetry frame once a
//! second, and get a status acknowledgement back per frame. The server
//! multiplexes every connection from one cooperative loop (no threads,
//! no spawned tasks) and keeps a per-device message counter.
//!
//! # Architecture
//!
//! - [`wire`]: the fixed 72-byte telemetry frame and 4-byte
//!   acknowledgement shared by both sides. Byte-for-byte compatible with
//!   the fielded devices; this is the system's one hard contract.
//! - [`registry`]: the bounded, ordered set of watched sockets and the
//!   readiness wait that drives the loop.
//! - [`server`]: accept, dispatch, count, acknowledge.
//! - [`device`]: the device-side send loop.
//!
//! The monitor requires a Unix host; readiness comes from `AsyncFd` over
//! non-blocking sockets.
//!
//! # Example
//!
//! ```rust,no_run
//! use basestation::{Config, MonitorServer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> basestation::Result<()> {
//!     let config = Config::default();
//!     let mut server = MonitorServer::bind(&config)?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod device;
mod error;
pub mod registry;
pub mod server;
pub mod wire;

pub use config::Config;
pub use device::DeviceSimulator;
pub use error::{MonitorError, Result};
pub use server::MonitorServer;
pub use wire::{Ack, TelemetryFrame};
