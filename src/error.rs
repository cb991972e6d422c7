//! Error types for the monitoring pipeline.
//!
//! Every fallible operation in the crate returns [`MonitorError`]. Variants
//! split into two families with different blast radius:
//!
//! - **Fatal** errors abort the process that hit them: address/bind/listen
//!   failures, a non-would-block accept failure, the idle-timeout elapsing,
//!   an out-of-range device id, and configuration errors.
//! - **Per-connection** errors demote a single connection to closed and let
//!   the server loop continue: read/write failures, short or truncated
//!   records, and unexpected readiness on a watched socket.
//!
//! [`MonitorError::is_fatal`] encodes the split so callers never have to
//! match the full variant list to decide whether to keep running.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for monitoring operations.
pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

/// Main error type for the telemetry pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MonitorError {
    #[error("invalid listen address '{addr}'")]
    BadAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("address {addr} is already in use")]
    AddressInUse {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket setup failed during {operation}")]
    SocketSetup {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("accepting a device connection failed")]
    Accept {
        #[source]
        source: io::Error,
    },

    #[error("reading from {peer} failed")]
    Read {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("writing an acknowledgement to {peer} failed")]
    Write {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("record too short: expected {expected} bytes, got {actual}")]
    ShortRecord { expected: usize, actual: usize },

    #[error("stream ended mid-record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unexpected readiness on connection {peer}")]
    UnexpectedReadiness { peer: SocketAddr },

    #[error("no device activity for {timeout:?}")]
    IdleTimeout { timeout: Duration },

    #[error("device id {id} out of range, must be between 1 and {max}")]
    InvalidDeviceId { id: i64, max: usize },

    #[error("device name of {len} bytes does not fit a {max}-byte field")]
    NameTooLong { len: usize, max: usize },

    #[error("configuration error: {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl MonitorError {
    /// Returns whether this error must terminate the process that hit it.
    ///
    /// Non-fatal errors cost one connection; the server loop (or the device
    /// send loop, for read failures) carries on.
    pub fn is_fatal(&self) -> bool {
        match self {
            MonitorError::BadAddress { .. } => true,
            MonitorError::AddressInUse { .. } => true,
            MonitorError::SocketSetup { .. } => true,
            MonitorError::Accept { .. } => true,
            MonitorError::IdleTimeout { .. } => true,
            MonitorError::InvalidDeviceId { .. } => true,
            MonitorError::Config { .. } => true,
            MonitorError::Read { .. } => false,
            MonitorError::Write { .. } => false,
            MonitorError::ShortRecord { .. } => false,
            MonitorError::Truncated { .. } => false,
            MonitorError::UnexpectedReadiness { .. } => false,
            MonitorError::NameTooLong { .. } => false,
        }
    }

    /// Helper constructor for bind failures, classifying address reuse.
    pub fn bind_failed(addr: SocketAddr, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            MonitorError::AddressInUse { addr, source }
        } else {
            MonitorError::SocketSetup { operation: "bind", source }
        }
    }

    /// Helper constructor for socket option and registration failures.
    pub fn socket_setup(operation: &'static str, source: io::Error) -> Self {
        MonitorError::SocketSetup { operation, source }
    }

    /// Helper constructor for fatal accept failures.
    pub fn accept_failed(source: io::Error) -> Self {
        MonitorError::Accept { source }
    }

    /// Helper constructor for per-connection read failures.
    pub fn read_failed(peer: SocketAddr, source: io::Error) -> Self {
        MonitorError::Read { peer, source }
    }

    /// Helper constructor for per-connection write failures.
    pub fn write_failed(peer: SocketAddr, source: io::Error) -> Self {
        MonitorError::Write { peer, source }
    }

    /// Helper constructor for configuration errors with path context.
    pub fn config_error(
        path: PathBuf,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MonitorError::Config { path, source: Box::new(source) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn messages_carry_their_context(
                expected in 1usize..1024,
                actual in 0usize..1024,
                id in -1000i64..1000,
                timeout_ms in 1u64..600_000,
            ) {
                let short = MonitorError::ShortRecord { expected, actual };
                prop_assert!(short.to_string().contains(&expected.to_string()));
                prop_assert!(short.to_string().contains(&actual.to_string()));

                let invalid = MonitorError::InvalidDeviceId { id, max: 5 };
                prop_assert!(invalid.to_string().contains(&id.to_string()));

                let idle = MonitorError::IdleTimeout {
                    timeout: Duration::from_millis(timeout_ms),
                };
                prop_assert!(!idle.to_string().is_empty());
            }

            #[test]
            fn fatality_is_stable_across_payloads(
                expected in 1usize..1024,
                actual in 0usize..1024,
            ) {
                // Classification depends on the variant, never on its fields.
                prop_assert!(
                    !MonitorError::ShortRecord { expected, actual }.is_fatal(),
                    "ShortRecord must not be fatal"
                );
                prop_assert!(
                    !MonitorError::Truncated { expected, actual }.is_fatal(),
                    "Truncated must not be fatal"
                );
            }
        }
    }

    #[test]
    fn bind_failure_classification() {
        let addr: SocketAddr = "127.0.0.1:8100".parse().unwrap();

        let in_use =
            MonitorError::bind_failed(addr, io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        assert!(matches!(in_use, MonitorError::AddressInUse { .. }));

        let denied = MonitorError::bind_failed(
            addr,
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(denied, MonitorError::SocketSetup { .. }));
    }

    #[test]
    fn taxonomy_split_matches_propagation_rules() {
        let addr: SocketAddr = "127.0.0.1:8100".parse().unwrap();
        let io_err = || io::Error::other("boom");

        assert!(MonitorError::accept_failed(io_err()).is_fatal());
        assert!(MonitorError::IdleTimeout { timeout: Duration::from_secs(180) }.is_fatal());
        assert!(MonitorError::InvalidDeviceId { id: 0, max: 5 }.is_fatal());

        assert!(!MonitorError::read_failed(addr, io_err()).is_fatal());
        assert!(!MonitorError::write_failed(addr, io_err()).is_fatal());
        assert!(!MonitorError::UnexpectedReadiness { peer: addr }.is_fatal());
    }

    #[test]
    fn error_traits() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<MonitorError>();

        let error = MonitorError::accept_failed(io::Error::other("boom"));
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn source_chain_is_preserved() {
        let source = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let error = MonitorError::read_failed(addr, source);

        let chained = std::error::Error::source(&error).expect("source should be chained");
        assert!(chained.to_string().contains("reset by peer"));
    }
}
