//! Configuration for the Directory Service and the chat client.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use parley_transport::DEFAULT_MAX_FRAME;

/// Default address the Directory Service listens on.
pub const DEFAULT_DIRECTORY_ADDR: &str = "127.0.0.1:5555";

/// Directory Service settings.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Stream address to accept directory requests on. Startup liveness
    /// probes are sent from a datagram socket on the same IP.
    pub bind_addr: String,
    /// Snapshot journal. `None` keeps the registry in memory only and
    /// skips startup recovery.
    pub journal_path: Option<PathBuf>,
    /// How long a connection may take to deliver its request.
    pub request_timeout: Duration,
    /// How long to wait for each member's reply to a liveness probe.
    pub probe_timeout: Duration,
    /// Largest accepted request, in bytes.
    pub max_request_size: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_DIRECTORY_ADDR.to_string(),
            journal_path: None,
            request_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            max_request_size: DEFAULT_MAX_FRAME,
        }
    }
}

impl DirectoryConfig {
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }
}

/// Chat client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where the Directory Service listens.
    pub directory_addr: SocketAddr,
    /// Local datagram address. Port 0 picks an ephemeral port; the same
    /// port is then used as the source of directory connections.
    pub bind_addr: SocketAddr,
    /// Deadline for one directory request/response exchange.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 5555)),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn with_directory(mut self, addr: SocketAddr) -> Self {
        self.directory_addr = addr;
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
