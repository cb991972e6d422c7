//! Simulated device endpoint.
//!
//! One simulator represents one remote device: it keeps a long-lived
//! stream to the monitoring server and alternates write-frame / read-ack
//! at a fixed cadence. When the server is unreachable the simulator stays
//! alive and retries the connection on its next tick; only a failed frame
//! write terminates it. A failed acknowledgement read is logged and the
//! loop continues, so a dying server surfaces through the next write
//! rather than killing the process mid-read. Broken pipes never raise a
//! signal here; Rust ignores SIGPIPE by default and the write error
//! travels the normal error path.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{info, warn};

use crate::config::Config;
use crate::wire::{ACK_LEN, Ack, TelemetryFrame};
use crate::{MonitorError, Result};

/// Prefix of the generated device names; ids map to `device_<id>`.
const DEVICE_NAME_PREFIX: &str = "device_";

/// One simulated telemetry device.
#[derive(Debug)]
pub struct DeviceSimulator {
    device_id: i32,
    name: String,
    server_addr: SocketAddr,
    send_interval: Duration,
    stream: Option<TcpStream>,
}

impl DeviceSimulator {
    /// Build a simulator for the given id.
    ///
    /// Ids are valid in `1..=max_devices`; anything else fails with
    /// [`MonitorError::InvalidDeviceId`] before any socket work happens.
    pub fn new(id: i64, config: &Config) -> Result<Self> {
        if id < 1 || id > config.max_devices as i64 {
            return Err(MonitorError::InvalidDeviceId { id, max: config.max_devices });
        }
        Ok(Self {
            device_id: id as i32,
            name: format!("{DEVICE_NAME_PREFIX}{id}"),
            server_addr: config.server_addr()?,
            send_interval: config.send_interval(),
            stream: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Attempt to open the stream to the monitoring server.
    ///
    /// Socket construction failures are fatal; a refused or unreachable
    /// connection is logged and leaves the simulator unconnected so the
    /// next tick can retry.
    pub async fn connect(&mut self) -> Result<()> {
        let socket = match self.server_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| MonitorError::socket_setup("socket creation", e))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| MonitorError::socket_setup("address reuse option", e))?;
        socket
            .set_keepalive(true)
            .map_err(|e| MonitorError::socket_setup("keepalive option", e))?;

        match socket.connect(self.server_addr).await {
            Ok(stream) => {
                info!(device = %self.name, server = %self.server_addr, "connected to monitor");
                self.stream = Some(stream);
            }
            Err(e) => {
                warn!(
                    device = %self.name,
                    server = %self.server_addr,
                    error = %e,
                    "monitor server not reachable"
                );
            }
        }
        Ok(())
    }

    /// Produce the next telemetry frame for this device.
    pub fn sample(&self) -> TelemetryFrame {
        TelemetryFrame {
            device_id: self.device_id,
            device_name: self.name.clone(),
            data: fastrand::i32(0..100),
        }
    }

    /// One round trip: send a frame, read its acknowledgement.
    ///
    /// Returns the acknowledged status, or `None` when no exchange
    /// happened (not connected yet, or the reply never arrived). A write
    /// failure is the one terminal condition and propagates as an error.
    pub async fn exchange(&mut self) -> Result<Option<i32>> {
        let frame = self.sample();
        let encoded = frame.encode()?;

        let Some(stream) = self.stream.as_mut() else {
            warn!(device = %self.name, "monitor server is not alive, trying to connect again");
            self.connect().await?;
            return Ok(None);
        };

        info!(device = %self.name, data = frame.data, "sending telemetry");
        stream
            .write_all(&encoded)
            .await
            .map_err(|e| MonitorError::write_failed(self.server_addr, e))?;

        match read_ack(stream, self.server_addr).await {
            Ok(ack) => {
                info!(device = %self.name, status = ack.status, "acknowledgement received");
                Ok(Some(ack.status))
            }
            Err(err) => {
                warn!(device = %self.name, error = %err, "no acknowledgement for this frame");
                Ok(None)
            }
        }
    }

    /// Exchange frames at the configured cadence until a write fails.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.exchange().await?;
            tokio::time::sleep(self.send_interval).await;
        }
    }
}

/// Read exactly one acknowledgement record.
///
/// A stream that ends before the record is complete reports
/// [`MonitorError::Truncated`] with the bytes actually seen.
async fn read_ack(stream: &mut TcpStream, peer: SocketAddr) -> Result<Ack> {
    let mut buf = [0u8; ACK_LEN];
    let mut filled = 0usize;
    while filled < ACK_LEN {
        let n = stream
            .read(&mut buf[filled..])
            .await
            .map_err(|e| MonitorError::read_failed(peer, e))?;
        if n == 0 {
            return Err(MonitorError::Truncated { expected: ACK_LEN, actual: filled });
        }
        filled += n;
    }
    Ack::decode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_outside_the_device_range_are_rejected() {
        let config = Config::default();

        for id in [0, 6, -3, i64::MAX] {
            let err = DeviceSimulator::new(id, &config).unwrap_err();
            assert!(matches!(err, MonitorError::InvalidDeviceId { max: 5, .. }), "id {id}");
        }
    }

    #[test]
    fn full_id_range_is_accepted() {
        let config = Config::default();
        for id in 1..=5 {
            let simulator = DeviceSimulator::new(id, &config).unwrap();
            assert_eq!(simulator.device_name(), format!("device_{id}"));
            assert!(!simulator.is_connected());
        }
    }

    #[test]
    fn samples_carry_identity_and_bounded_data() {
        let simulator = DeviceSimulator::new(3, &Config::default()).unwrap();
        for _ in 0..200 {
            let frame = simulator.sample();
            assert_eq!(frame.device_id, 3);
            assert_eq!(frame.device_name, "device_3");
            assert!((0..100).contains(&frame.data));
        }
    }

    #[test]
    fn sampled_frames_fit_the_wire_layout() {
        let simulator = DeviceSimulator::new(5, &Config::default()).unwrap();
        assert!(simulator.sample().encode().is_ok());
    }
}
