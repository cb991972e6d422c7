//! Bounded registry of watched sockets.
//!
//! The registry owns every socket the server holds: the listener, which is
//! registered first and never leaves, and up to `max_peers` device
//! connections. Entries keep their insertion order; removal compacts the
//! slot array by shifting later entries down, so the relative order of
//! survivors is stable. Servicing order within one readiness pass follows
//! registry order, which makes the order observable: of two devices ready
//! at the same wake, the one registered earlier is read first.
//!
//! Entries are addressed by [`Token`], not by position. Positions move on
//! compaction; tokens never do, so a removal mid-pass cannot redirect the
//! servicing of a later entry.
//!
//! Readiness comes from [`AsyncFd`] over non-blocking `std::net` sockets.
//! [`Registry::ready`] polls every entry and resolves with all currently
//! ready tokens; it holds no readiness state of its own, so a socket whose
//! data was not fully drained simply reports ready again on the next pass.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::task::Poll;

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

/// Stable handle to one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

/// One readiness event out of [`Registry::ready`].
#[derive(Debug, Clone, Copy)]
pub struct Wake {
    pub token: Token,
    /// Readiness polling itself failed for this entry. The socket is in an
    /// unusable state and must be closed without invoking its handler.
    pub failed: bool,
}

/// A watched device connection.
pub struct PeerSlot {
    pub(crate) io: AsyncFd<TcpStream>,
    pub addr: SocketAddr,
    /// Label learned from the first decoded frame; used for logging and
    /// counting only, never for routing.
    pub device_id: Option<i32>,
}

enum Watched {
    Listener(AsyncFd<TcpListener>),
    Peer(PeerSlot),
}

struct Entry {
    token: Token,
    watched: Watched,
}

/// Ordered, bounded set of sockets watched for read readiness.
pub struct Registry {
    slots: Vec<Entry>,
    max_peers: usize,
    next_token: u64,
}

impl Registry {
    /// Build a registry around its permanent listener entry.
    ///
    /// The listener must already be non-blocking. Must be called from
    /// within a tokio runtime; readiness registration happens here.
    pub fn new(listener: TcpListener, max_peers: usize) -> io::Result<Self> {
        let io = AsyncFd::with_interest(listener, Interest::READABLE)?;
        let mut registry = Self { slots: Vec::with_capacity(max_peers + 1), max_peers, next_token: 0 };
        let token = registry.mint_token();
        registry.slots.push(Entry { token, watched: Watched::Listener(io) });
        Ok(registry)
    }

    fn mint_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Append a device connection. The stream must already be non-blocking.
    ///
    /// Callers check [`Registry::is_full`] first; watching beyond capacity
    /// is a logic error.
    pub fn watch_peer(&mut self, stream: TcpStream, addr: SocketAddr) -> io::Result<Token> {
        debug_assert!(!self.is_full());
        let io = AsyncFd::with_interest(stream, Interest::READABLE)?;
        let token = self.mint_token();
        self.slots.push(Entry {
            token,
            watched: Watched::Peer(PeerSlot { io, addr, device_id: None }),
        });
        Ok(token)
    }

    /// Remove a device entry, compacting by shifting later entries down.
    ///
    /// Returns the removed slot so the caller can log its identity; the
    /// socket closes when the slot drops. The listener entry is never
    /// removable and yields `None`.
    pub fn unwatch(&mut self, token: Token) -> Option<PeerSlot> {
        let position = self
            .slots
            .iter()
            .position(|e| e.token == token && matches!(e.watched, Watched::Peer(_)))?;
        match self.slots.remove(position).watched {
            Watched::Peer(slot) => Some(slot),
            Watched::Listener(_) => unreachable!("position matched a peer entry"),
        }
    }

    /// Token of the permanent listener entry.
    pub fn listener_token(&self) -> Token {
        self.slots[0].token
    }

    pub fn is_listener(&self, token: Token) -> bool {
        token == self.listener_token()
    }

    pub fn contains(&self, token: Token) -> bool {
        self.slots.iter().any(|e| e.token == token)
    }

    /// Number of device entries currently watched (the listener does not
    /// count against capacity).
    pub fn peer_count(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_full(&self) -> bool {
        self.peer_count() >= self.max_peers
    }

    pub(crate) fn listener(&self) -> &AsyncFd<TcpListener> {
        match &self.slots[0].watched {
            Watched::Listener(io) => io,
            Watched::Peer(_) => unreachable!("slot 0 is always the listener"),
        }
    }

    pub(crate) fn peer(&self, token: Token) -> Option<&PeerSlot> {
        self.slots.iter().find_map(|e| match &e.watched {
            Watched::Peer(slot) if e.token == token => Some(slot),
            _ => None,
        })
    }

    pub(crate) fn peer_mut(&mut self, token: Token) -> Option<&mut PeerSlot> {
        self.slots.iter_mut().find_map(|e| match &mut e.watched {
            Watched::Peer(slot) if e.token == token => Some(slot),
            _ => None,
        })
    }

    /// Tokens of all device entries, in registry order.
    pub fn peer_tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.slots.iter().filter_map(|e| match e.watched {
            Watched::Peer(_) => Some(e.token),
            Watched::Listener(_) => None,
        })
    }

    /// Suspend until at least one watched socket reports read readiness,
    /// then yield every currently ready entry in registry order.
    ///
    /// Readiness is left untouched here; consuming it (or clearing it on
    /// would-block) is the dispatcher's job.
    pub async fn ready(&self) -> Vec<Wake> {
        std::future::poll_fn(|cx| {
            let mut wakes = Vec::new();
            for entry in &self.slots {
                let poll = match &entry.watched {
                    Watched::Listener(io) => io.poll_read_ready(cx).map(|r| r.map(drop)),
                    Watched::Peer(slot) => slot.io.poll_read_ready(cx).map(|r| r.map(drop)),
                };
                match poll {
                    Poll::Ready(Ok(())) => wakes.push(Wake { token: entry.token, failed: false }),
                    Poll::Ready(Err(_)) => wakes.push(Wake { token: entry.token, failed: true }),
                    Poll::Pending => {}
                }
            }
            if wakes.is_empty() { Poll::Pending } else { Poll::Ready(wakes) }
        })
        .await
    }
}
