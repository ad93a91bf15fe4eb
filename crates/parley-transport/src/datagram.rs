//! Unreliable datagram transport (UDP).
//!
//! Sends are fire-and-forget: a successful `send_to` only means the
//! kernel accepted the datagram, not that anyone received it.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::TransportError;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A bound datagram socket.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    /// Binds a datagram socket to `addr` (use port 0 for an ephemeral port).
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        let local = socket.local_addr().map_err(TransportError::BindFailed)?;
        tracing::debug!(%local, "datagram socket bound");
        Ok(Self { socket })
    }

    /// Returns the address this socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::BindFailed)
    }

    /// Sends one datagram to `target`.
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::FrameTooLarge {
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.socket
            .send_to(data, target)
            .await
            .map_err(TransportError::SendFailed)?;
        Ok(())
    }

    /// Waits for the next datagram and returns its payload and sender.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        buf.truncate(len);
        Ok((buf, from))
    }
}
