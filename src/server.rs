//! Monitoring server: one cooperative loop over every socket it holds.
//!
//! The server accepts device connections on a single listening endpoint,
//! reads one telemetry frame per readiness event, counts it against the
//! sending device, and acknowledges it before touching any other socket.
//! There are no worker threads and no spawned tasks; every socket is
//! serviced from [`MonitorServer::run`], so the registry and the counter
//! table need no locking.
//!
//! A quiet period longer than the configured idle timeout terminates the
//! loop with [`MonitorError::IdleTimeout`]. That a long-running monitor
//! dies when all devices go silent is deliberate, inherited behavior; the
//! window is configurable but elapse is always fatal.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use futures::FutureExt;
use tokio::net::TcpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::registry::{Registry, Token, Wake};
use crate::wire::{ACK_LEN, Ack, TELEMETRY_FRAME_LEN, TelemetryFrame};
use crate::{MonitorError, Result};

/// Outcome of the single non-blocking read attempted per readiness event.
enum ReadOutcome {
    /// Bytes arrived; holds the count.
    Data(usize),
    /// Zero-byte read: the peer closed its end.
    PeerClosed,
    /// Readiness was stale or already consumed; nothing to do this pass.
    NotReady,
    /// The read (or the readiness poll) failed outright.
    Failed(io::Error),
}

/// Single-process monitoring server.
///
/// All state lives on the instance: the socket registry and the per-device
/// message counters. Nothing is process-global, so tests can run several
/// servers side by side.
pub struct MonitorServer {
    registry: Registry,
    counters: HashMap<i32, u64>,
    local_addr: SocketAddr,
    idle_timeout: Duration,
}

impl MonitorServer {
    /// Bind the monitoring endpoint and set up the readiness registry.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`MonitorError::BadAddress`] for an unparseable host,
    /// [`MonitorError::AddressInUse`] when the endpoint is taken, and
    /// [`MonitorError::SocketSetup`] for any other construction failure.
    pub fn bind(config: &Config) -> Result<Self> {
        let addr = config.server_addr()?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| MonitorError::socket_setup("socket creation", e))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| MonitorError::socket_setup("address reuse option", e))?;
        socket.bind(addr).map_err(|e| MonitorError::bind_failed(addr, e))?;

        let listener = socket
            .listen(config.backlog)
            .map_err(|e| MonitorError::socket_setup("listen", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MonitorError::socket_setup("local address lookup", e))?;
        let listener = listener
            .into_std()
            .map_err(|e| MonitorError::socket_setup("listener conversion", e))?;

        let registry = Registry::new(listener, config.max_devices)
            .map_err(|e| MonitorError::socket_setup("readiness registration", e))?;

        info!(addr = %local_addr, "monitor server listening");

        Ok(Self {
            registry,
            counters: HashMap::new(),
            local_addr,
            idle_timeout: config.idle_timeout(),
        })
    }

    /// Address the server is actually bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Frames successfully consumed from the given device since start.
    pub fn message_count(&self, device_id: i32) -> u64 {
        self.counters.get(&device_id).copied().unwrap_or(0)
    }

    /// Number of device connections currently held.
    pub fn connected_devices(&self) -> usize {
        self.registry.peer_count()
    }

    /// Drive the readiness loop until a fatal condition.
    ///
    /// Returns only on error: a fatal accept failure or the idle timeout.
    /// Per-connection failures close that connection and the loop carries
    /// on.
    pub async fn run(&mut self) -> Result<()> {
        info!("monitor server entering readiness loop");
        loop {
            let wakes = timeout(self.idle_timeout, self.registry.ready())
                .await
                .map_err(|_| MonitorError::IdleTimeout { timeout: self.idle_timeout })?;
            self.dispatch(wakes)?;
        }
    }

    /// Service one batch of ready entries, in registry order.
    fn dispatch(&mut self, wakes: Vec<Wake>) -> Result<()> {
        for wake in wakes {
            // A close earlier in this pass may have removed the entry.
            if !self.registry.contains(wake.token) {
                continue;
            }

            if self.registry.is_listener(wake.token) {
                if wake.failed {
                    return Err(MonitorError::accept_failed(io::Error::other(
                        "readiness polling failed on the listener",
                    )));
                }
                self.accept_all()?;
            } else if wake.failed {
                if let Some(peer) = self.registry.peer(wake.token) {
                    let err = MonitorError::UnexpectedReadiness { peer: peer.addr };
                    warn!(error = %err, "dropping connection");
                }
                self.close_peer(wake.token, "unexpected readiness state");
            } else {
                self.service_peer(wake.token);
            }
        }
        Ok(())
    }

    /// Accept pending connections until the kernel reports would-block.
    ///
    /// Connections beyond capacity are accepted and closed immediately so
    /// the accept queue cannot silently hold them. Any accept error other
    /// than would-block is fatal.
    fn accept_all(&mut self) -> Result<()> {
        let mut accepted: Vec<(TcpStream, SocketAddr)> = Vec::new();
        {
            let Some(ready) = self.registry.listener().readable().now_or_never() else {
                return Ok(());
            };
            let mut guard = ready.map_err(MonitorError::accept_failed)?;
            loop {
                match guard.try_io(|io| io.get_ref().accept()) {
                    Ok(Ok(pair)) => accepted.push(pair),
                    Ok(Err(e)) => return Err(MonitorError::accept_failed(e)),
                    Err(_would_block) => break,
                }
            }
        }

        for (stream, addr) in accepted {
            if self.registry.is_full() {
                warn!(peer = %addr, held = self.registry.peer_count(),
                    "device capacity reached, closing new connection");
                continue;
            }
            if let Err(e) = stream.set_nonblocking(true) {
                warn!(peer = %addr, error = %e, "could not configure accepted socket");
                continue;
            }
            match self.registry.watch_peer(stream, addr) {
                Ok(_) => info!(peer = %addr, "new device connection accepted"),
                Err(e) => {
                    warn!(peer = %addr, error = %e, "could not watch accepted socket");
                }
            }
        }
        Ok(())
    }

    /// Consume one telemetry frame from a ready connection and acknowledge
    /// it.
    ///
    /// The frame is indivisible: a partial read is discarded and costs the
    /// connection. The acknowledgement is written synchronously, so from
    /// the device's side every consumed frame is answered before anything
    /// else happens on that stream.
    fn service_peer(&mut self, token: Token) {
        let Some(addr) = self.registry.peer(token).map(|p| p.addr) else {
            return;
        };

        let mut buf = [0u8; TELEMETRY_FRAME_LEN];
        let outcome = {
            let Some(peer) = self.registry.peer(token) else { return };
            match peer.io.readable().now_or_never() {
                None => ReadOutcome::NotReady,
                Some(Err(e)) => ReadOutcome::Failed(e),
                Some(Ok(mut guard)) => {
                    match guard.try_io(|io| {
                        let mut stream = io.get_ref();
                        stream.read(&mut buf)
                    }) {
                        Ok(Ok(0)) => ReadOutcome::PeerClosed,
                        Ok(Ok(n)) => ReadOutcome::Data(n),
                        Ok(Err(e)) => ReadOutcome::Failed(e),
                        Err(_would_block) => ReadOutcome::NotReady,
                    }
                }
            }
        };

        let frame_len = match outcome {
            ReadOutcome::NotReady => return,
            ReadOutcome::PeerClosed => {
                self.close_peer(token, "peer closed the stream");
                return;
            }
            ReadOutcome::Failed(e) => {
                warn!(error = %MonitorError::read_failed(addr, e), "dropping connection");
                self.close_peer(token, "read failure");
                return;
            }
            ReadOutcome::Data(n) if n < TELEMETRY_FRAME_LEN => {
                let err = MonitorError::ShortRecord { expected: TELEMETRY_FRAME_LEN, actual: n };
                warn!(peer = %addr, error = %err, "discarding partial frame");
                self.close_peer(token, "partial frame");
                return;
            }
            ReadOutcome::Data(n) => n,
        };

        let frame = match TelemetryFrame::decode(&buf[..frame_len]) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %addr, error = %e, "undecodable frame");
                self.close_peer(token, "undecodable frame");
                return;
            }
        };

        if let Some(peer) = self.registry.peer_mut(token) {
            peer.device_id = Some(frame.device_id);
        }

        let total = self.counters.entry(frame.device_id).and_modify(|c| *c += 1).or_insert(1);
        info!(
            device = %frame.device_name,
            data = frame.data,
            total = *total,
            "telemetry frame received"
        );

        if let Err(e) = self.send_ack(token) {
            warn!(error = %MonitorError::write_failed(addr, e), "dropping connection");
            self.close_peer(token, "acknowledgement write failure");
        }
    }

    /// Write one acknowledgement, whole or not at all.
    fn send_ack(&self, token: Token) -> io::Result<()> {
        let Some(peer) = self.registry.peer(token) else {
            return Ok(());
        };
        let mut stream = peer.io.get_ref();
        let written = stream.write(&Ack::OK.encode())?;
        if written < ACK_LEN {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("acknowledgement write split after {written} bytes"),
            ));
        }
        Ok(())
    }

    /// Retire a device connection and compact its slot.
    fn close_peer(&mut self, token: Token, reason: &str) {
        if let Some(slot) = self.registry.unwatch(token) {
            debug!(
                peer = %slot.addr,
                device_id = ?slot.device_id,
                reason,
                remaining = self.registry.peer_count(),
                "device connection closed"
            );
        }
    }
}
