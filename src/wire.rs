//! Wire record codec shared by the server and the devices.
//!
//! Two fixed-layout records travel over each connection:
//!
//! 1. **Telemetry frame** (device to server, 72 bytes): device id, device
//!    name, data payload.
//! 2. **Acknowledgement** (server to device, 4 bytes): status code.
//!
//! ## Layout
//!
//! Fields are laid out back to back with no padding, in the byte order of
//! the deployment host. The layout is byte-for-byte compatible with the
//! fielded devices and must not change:
//!
//! ```text
//! telemetry frame
//!   i32  device_id       offset  0
//!   [u8; 64] device_name offset  4   zero-padded, zero-terminated by sender
//!   i32  data            offset 68
//!
//! acknowledgement
//!   i32  status          offset  0
//! ```
//!
//! Native byte order is deliberate: both ends of the deployment share a
//! host architecture and the fielded record layout is the compatibility
//! contract. Pinning an explicit endianness would break the installed
//! base.
//!
//! Records are indivisible: the decoder rejects anything shorter than the
//! record with [`MonitorError::ShortRecord`], and the read paths report a
//! stream that ends mid-record as [`MonitorError::Truncated`].

use crate::{MonitorError, Result};

/// Fixed size of the device name field, including the zero terminator.
pub const DEVICE_NAME_LEN: usize = 64;

/// Wire size of one telemetry frame.
pub const TELEMETRY_FRAME_LEN: usize = 4 + DEVICE_NAME_LEN + 4;

/// Wire size of one acknowledgement.
pub const ACK_LEN: usize = 4;

/// Status code for a successfully consumed frame.
pub const STATUS_OK: i32 = 200;

/// One telemetry report from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryFrame {
    /// Unique device id, also the counter-table key on the server.
    pub device_id: i32,
    /// Human-readable device label, at most [`DEVICE_NAME_LEN`] - 1 bytes.
    pub device_name: String,
    /// Sampled payload value.
    pub data: i32,
}

impl TelemetryFrame {
    /// Encode into the fixed wire layout.
    ///
    /// Fails with [`MonitorError::NameTooLong`] when the name cannot be
    /// stored with its required zero terminator.
    pub fn encode(&self) -> Result<[u8; TELEMETRY_FRAME_LEN]> {
        let name = self.device_name.as_bytes();
        if name.len() >= DEVICE_NAME_LEN {
            return Err(MonitorError::NameTooLong { len: name.len(), max: DEVICE_NAME_LEN });
        }

        let mut buf = [0u8; TELEMETRY_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.device_id.to_ne_bytes());
        buf[4..4 + name.len()].copy_from_slice(name);
        buf[68..72].copy_from_slice(&self.data.to_ne_bytes());
        Ok(buf)
    }

    /// Decode from exactly one wire record.
    ///
    /// The name field decodes up to its first zero byte; bytes after the
    /// terminator are ignored. Fails with [`MonitorError::ShortRecord`]
    /// when fewer than [`TELEMETRY_FRAME_LEN`] bytes are given.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < TELEMETRY_FRAME_LEN {
            return Err(MonitorError::ShortRecord {
                expected: TELEMETRY_FRAME_LEN,
                actual: buf.len(),
            });
        }

        Ok(Self {
            device_id: read_i32_ne(buf, 0)?,
            device_name: zero_terminated_string(&buf[4..4 + DEVICE_NAME_LEN]),
            data: read_i32_ne(buf, 68)?,
        })
    }
}

/// Status reply the server writes after consuming a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: i32,
}

impl Ack {
    /// The only acknowledgement the server currently produces.
    pub const OK: Ack = Ack { status: STATUS_OK };

    /// Encode into the fixed wire layout.
    pub fn encode(&self) -> [u8; ACK_LEN] {
        self.status.to_ne_bytes()
    }

    /// Decode from exactly one wire record.
    ///
    /// Unrecognised status codes are not an error here; the set may grow
    /// in a backward-compatible way and receivers must tolerate it.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ACK_LEN {
            return Err(MonitorError::ShortRecord { expected: ACK_LEN, actual: buf.len() });
        }
        Ok(Self { status: read_i32_ne(buf, 0)? })
    }
}

/// Bounds-checked native-endian field reader.
fn read_i32_ne(data: &[u8], offset: usize) -> Result<i32> {
    let end = offset + 4;
    if end > data.len() {
        return Err(MonitorError::ShortRecord { expected: end, actual: data.len() });
    }
    Ok(i32::from_ne_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]))
}

/// Extract a string from a zero-padded fixed field, stopping at the first
/// zero byte.
fn zero_terminated_string(bytes: &[u8]) -> String {
    let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..nul]).to_string()
}
