//! Transport layer for Parley.
//!
//! Two very different transports live here:
//!
//! - A reliable, line-framed stream transport ([`TcpTransport`] /
//!   [`TcpConnection`]) behind the [`Transport`] and [`Connection`]
//!   traits. The Directory Service uses it for its one-request,
//!   one-response exchanges.
//! - An unreliable datagram socket ([`DatagramSocket`]) that peers use to
//!   talk to each other directly, and that the Directory Service uses for
//!   liveness probes after a restart.
//!
//! Neither knows anything about message contents; they move bytes.

#![allow(async_fn_in_trait)]

mod datagram;
mod error;
mod tcp;

pub use datagram::{DatagramSocket, MAX_DATAGRAM_SIZE};
pub use error::TransportError;
pub use tcp::{DEFAULT_MAX_FRAME, TcpConnection, TcpTransport};

use std::fmt;
use std::net::SocketAddr;

/// Per-process number given to each directory connection, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener handing out one [`Connection`] per accepted client.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The bound listen address (useful after binding port 0).
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// One stream connection carrying whole frames in both directions.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes `data` as one frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next frame, or `Ok(None)` once the peer has closed its
    /// side.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Stops sending; the peer sees end-of-stream after the last frame.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// Source address of the remote end as seen by this host.
    fn peer_addr(&self) -> SocketAddr;
}
