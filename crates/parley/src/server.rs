//! `DirectoryServer` builder and accept loop.
//!
//! This is the entry point for running the Directory Service. It ties the
//! layers together: transport → protocol → room registry, plus the
//! snapshot journal and startup recovery.

use std::net::{SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parley_protocol::{Codec, JsonCodec};
use parley_room::RoomRegistry;
use parley_transport::{DatagramSocket, TcpTransport, Transport};

use crate::handler::handle_connection;
use crate::journal::Journal;
use crate::recovery::reconcile;
use crate::{DirectoryConfig, ParleyError};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so every task can hold it. The registry does its own
/// locking.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: RoomRegistry,
    pub(crate) codec: C,
    pub(crate) config: DirectoryConfig,
}

/// Builder for configuring and starting a Directory Service.
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), parley::ParleyError> {
/// use parley::DirectoryServer;
///
/// let server = DirectoryServer::builder()
///     .bind("0.0.0.0:5555")
///     .journal("rooms.log")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DirectoryServerBuilder {
    config: DirectoryConfig,
}

impl DirectoryServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: DirectoryConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: DirectoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Enables the snapshot journal (and startup recovery) at `path`.
    pub fn journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.journal_path = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Binds the listener and, if a journal is configured, recovers the
    /// room table from it before returning.
    ///
    /// Recovery probes each journaled room's members, so this can take up
    /// to `probe_timeout` per stale member.
    pub async fn build(self) -> Result<DirectoryServer, ParleyError> {
        let config = self.config;
        let transport = TcpTransport::bind(&config.bind_addr)
            .await?
            .with_max_frame(config.max_request_size);
        let local = transport.local_addr()?;

        let registry = match &config.journal_path {
            Some(path) => recover_registry(path, local, config.probe_timeout).await?,
            None => RoomRegistry::new(),
        };

        let state = Arc::new(ServerState {
            registry,
            codec: JsonCodec,
            config,
        });
        Ok(DirectoryServer { transport, state })
    }
}

impl Default for DirectoryServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads the last snapshot, confirms which rooms are still live, and
/// returns a journaled registry holding the survivors.
async fn recover_registry(
    path: &Path,
    listen: SocketAddr,
    probe_timeout: Duration,
) -> Result<RoomRegistry, ParleyError> {
    let last = Journal::load_last(path)?;
    let registry = RoomRegistry::new().with_sink(Journal::open(path)?);

    let Some(snapshot) = last else {
        tracing::info!("no snapshot to recover");
        return Ok(registry);
    };
    tracing::info!(
        taken = %snapshot.timestamp,
        rooms = snapshot.rooms.len(),
        "recovering rooms from snapshot"
    );

    let probe_addr = match listen {
        SocketAddr::V4(v4) => SocketAddr::V4(SocketAddrV4::new(*v4.ip(), 0)),
        SocketAddr::V6(mut v6) => {
            v6.set_port(0);
            SocketAddr::V6(v6)
        }
    };
    let socket = DatagramSocket::bind(probe_addr).await?;
    let live = reconcile(snapshot.rooms, &socket, probe_timeout, &JsonCodec).await;
    registry.replace_all(live).await;
    Ok(registry)
}

/// A running Directory Service.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DirectoryServer {
    transport: TcpTransport,
    state: Arc<ServerState<JsonCodec>>,
}

impl DirectoryServer {
    /// Creates a new builder.
    pub fn builder() -> DirectoryServerBuilder {
        DirectoryServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ParleyError> {
        Ok(self.transport.local_addr()?)
    }

    /// The registry this server serves.
    pub fn registry(&self) -> &RoomRegistry {
        &self.state.registry
    }

    /// Runs the accept loop.
    ///
    /// Each accepted connection is handled on its own task, so a slow or
    /// broken client never holds up the others. A failed accept is logged
    /// and the loop carries on. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), ParleyError> {
        tracing::info!(addr = %self.local_addr()?, "directory service running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
