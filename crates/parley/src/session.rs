//! The Session Loop: one chat client in one room.
//!
//! The loop waits on exactly two sources, user commands and the datagram
//! socket, handles whichever is ready first, and goes back to waiting.
//! All protocol decisions are made by the [`RecoveryEngine`]; this module
//! only moves bytes and hands results to the UI.
//!
//! ```text
//!   UserCommand ──┐                           ┌──→ send_to(peer)
//!                 ├──→ select! ──→ engine ──→ ┤
//!   datagram   ───┘                           └──→ SessionOutput ──→ UI
//! ```

use std::net::SocketAddr;

use parley_protocol::{Codec, JsonCodec, Member, PeerDatagram};
use parley_session::{Action, Delivery, RecoveryEngine, SessionEvent};
use parley_transport::{DatagramSocket, TransportError};
use tokio::sync::mpsc;

use crate::{ClientConfig, DirectoryClient, ParleyError};

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Send a chat message to the room.
    Say(String),
    /// Leave the room and hand control back.
    Leave,
    /// Leave the room and stop.
    Exit,
}

/// What the session wants the user to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    Chat(Delivery),
    Event(SessionEvent),
    /// Something went wrong that the user should hear about but that does
    /// not stop the client, such as a directory that can't be reached.
    Notice(String),
}

/// How [`ChatSession::run`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user left the room; the caller may create or join another.
    Left,
    /// The user asked to exit, or the command channel closed.
    Exited,
}

/// One ready event.
enum Ready {
    Command(Option<UserCommand>),
    Datagram(Result<(Vec<u8>, SocketAddr), TransportError>),
}

/// A client's membership in one room.
pub struct ChatSession {
    socket: DatagramSocket,
    engine: RecoveryEngine,
    directory: DirectoryClient,
    codec: JsonCodec,
    output: mpsc::UnboundedSender<SessionOutput>,
}

impl ChatSession {
    /// Creates `room` and enters it as its only member.
    pub async fn create(
        config: &ClientConfig,
        room: &str,
        user: &str,
        output: mpsc::UnboundedSender<SessionOutput>,
    ) -> Result<Self, ParleyError> {
        let (socket, directory) = Self::connect(config).await?;
        let me = directory.create(room).await?;
        tracing::info!(%room, %me, "room created");

        let engine = RecoveryEngine::new(room, user, me, [me]);
        Ok(Self {
            socket,
            engine,
            directory,
            codec: JsonCodec,
            output,
        })
    }

    /// Joins `room` and announces ourselves to everyone already there.
    pub async fn join(
        config: &ClientConfig,
        room: &str,
        user: &str,
        output: mpsc::UnboundedSender<SessionOutput>,
    ) -> Result<Self, ParleyError> {
        let (socket, directory) = Self::connect(config).await?;
        let (me, members) = directory.join(room).await?;
        tracing::info!(%room, %me, members = members.len(), "room joined");

        let engine = RecoveryEngine::new(room, user, me, members);
        let session = Self {
            socket,
            engine,
            directory,
            codec: JsonCodec,
            output,
        };
        session.perform(session.engine.announce_join()).await;
        Ok(session)
    }

    /// Binds the datagram socket and a directory client that connects
    /// from the same address.
    async fn connect(config: &ClientConfig) -> Result<(DatagramSocket, DirectoryClient), ParleyError> {
        let socket = DatagramSocket::bind(config.bind_addr).await?;
        let local = socket.local_addr()?;
        let directory = DirectoryClient::from_config(config).bound_to(local);
        Ok((socket, directory))
    }

    /// Our address as the room knows it.
    pub fn me(&self) -> Member {
        self.engine.me()
    }

    pub fn engine(&self) -> &RecoveryEngine {
        &self.engine
    }

    /// Runs the loop until the user leaves or exits.
    ///
    /// Nothing here ends the client. A directory that can't be told about
    /// the leave is reported as a [`SessionOutput::Notice`] and the session
    /// still ends as asked; problems with individual datagrams are logged
    /// and skipped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<UserCommand>) -> SessionEnd {
        tracing::debug!(room = %self.engine.room(), me = %self.me(), "session loop started");
        loop {
            let ready = tokio::select! {
                command = commands.recv() => Ready::Command(command),
                received = self.socket.recv_from() => Ready::Datagram(received),
            };

            match ready {
                Ready::Command(Some(UserCommand::Say(text))) => {
                    let actions = self.engine.compose(text);
                    self.perform(actions).await;
                }
                Ready::Command(Some(UserCommand::Leave)) => {
                    self.leave().await;
                    return SessionEnd::Left;
                }
                Ready::Command(Some(UserCommand::Exit) | None) => {
                    self.leave().await;
                    return SessionEnd::Exited;
                }
                Ready::Datagram(Ok((data, from))) => self.on_datagram(&data, from).await,
                Ready::Datagram(Err(e)) => {
                    tracing::warn!(error = %e, "datagram receive failed");
                }
            }
        }
    }

    /// Tells the peers, then the directory, then forgets the room. The
    /// peers already know we are gone, so a directory failure only
    /// leaves a stale entry for its liveness check to clean up.
    async fn leave(&mut self) {
        self.perform(self.engine.announce_leave()).await;
        let room = self.engine.room().to_string();
        if let Err(e) = self.directory.leave(&room, self.engine.me()).await {
            tracing::warn!(%room, error = %e, "directory leave failed");
            let notice = format!("could not tell the directory we left '{room}': {e}");
            let _ = self.output.send(SessionOutput::Notice(notice));
        }
        tracing::info!(%room, "left room");
        self.engine.reset();
    }

    async fn on_datagram(&mut self, data: &[u8], from: SocketAddr) {
        let datagram = match self.codec.decode::<PeerDatagram>(data) {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::warn!(%from, error = %e, "dropping malformed datagram");
                return;
            }
        };
        match self.engine.handle(Member::from(from), datagram) {
            Ok(actions) => self.perform(actions).await,
            Err(e) => tracing::warn!(%from, error = %e, "dropping inconsistent datagram"),
        }
    }

    /// Carries out the engine's actions in order. Sends are fire-and-forget.
    async fn perform(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { to, datagram } => {
                    let bytes = match self.codec.encode(&datagram) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::error!(kind = datagram.kind(), error = %e, "encode failed");
                            continue;
                        }
                    };
                    for target in self.engine.resolve(&to) {
                        if let Err(e) = self.socket.send_to(&bytes, target.socket_addr()).await {
                            tracing::debug!(%target, error = %e, "send failed");
                        }
                    }
                }
                Action::Deliver(delivery) => {
                    let _ = self.output.send(SessionOutput::Chat(delivery));
                }
                Action::Notify(event) => {
                    let _ = self.output.send(SessionOutput::Event(event));
                }
            }
        }
    }
}
