//! Line-framed TCP transport.
//!
//! A frame is one line of UTF-8 text terminated by `\n`. A final frame
//! that ends at EOF without a newline is still delivered, so a peer that
//! writes its payload and closes its write half is understood too.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Default upper bound on a single frame, newline excluded.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame: usize,
}

impl TcpTransport {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame: DEFAULT_MAX_FRAME,
        })
    }

    /// Sets the frame size limit applied to accepted connections.
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let local = stream.local_addr().map_err(TransportError::AcceptFailed)?;
        let conn = TcpConnection::from_stream(stream, addr, local, self.max_frame);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::BindFailed)
    }
}

/// One line-framed TCP connection, usable from either end.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    local: SocketAddr,
    max_frame: usize,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpConnection {
    /// Opens a connection to `addr`.
    ///
    /// When `local` is given the socket is bound to it first (with
    /// `SO_REUSEADDR`), so the remote side sees exactly that source
    /// address. Clients use this to make their directory connection come
    /// from the same port as their datagram socket.
    pub async fn connect(
        addr: SocketAddr,
        local: Option<SocketAddr>,
    ) -> Result<Self, TransportError> {
        let stream = match local {
            None => TcpStream::connect(addr)
                .await
                .map_err(TransportError::ConnectFailed)?,
            Some(local) => {
                let socket = if local.is_ipv4() {
                    TcpSocket::new_v4()
                } else {
                    TcpSocket::new_v6()
                }
                .map_err(TransportError::ConnectFailed)?;
                socket
                    .set_reuseaddr(true)
                    .map_err(TransportError::BindFailed)?;
                socket.bind(local).map_err(TransportError::BindFailed)?;
                socket
                    .connect(addr)
                    .await
                    .map_err(TransportError::ConnectFailed)?
            }
        };
        let local = stream.local_addr().map_err(TransportError::ConnectFailed)?;
        Ok(Self::from_stream(stream, addr, local, DEFAULT_MAX_FRAME))
    }

    fn from_stream(
        stream: TcpStream,
        peer: SocketAddr,
        local: SocketAddr,
        max_frame: usize,
    ) -> Self {
        let (read, write) = stream.into_split();
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer,
            local,
            max_frame,
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
        }
    }

    /// Returns the local address of this connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(TransportError::SendFailed)?;
        writer.write_all(b"\n").await.map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        let mut frame = Vec::new();
        // Read at most one byte past the limit so oversize frames are
        // detected without buffering them whole.
        let limit = (self.max_frame + 1) as u64;
        let read = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut frame)
            .await
            .map_err(TransportError::ReceiveFailed)?;

        if read == 0 {
            return Ok(None);
        }
        if frame.last() == Some(&b'\n') {
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
        }
        if frame.len() > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                max: self.max_frame,
            });
        }
        Ok(Some(frame))
    }

    /// Shuts down the write half. The read half stays usable, so a
    /// client can close after its request and still read the answer.
    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
