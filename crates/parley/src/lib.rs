//! # Parley
//!
//! Rendezvous-style group chat. A small Directory Service keeps track of
//! which addresses belong to which named room; the chat itself travels
//! directly between members over UDP, with causal tracking and recovery of
//! lost messages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::{ChatSession, ClientConfig, DirectoryServer, UserCommand};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> Result<(), parley::ParleyError> {
//! // Directory Service
//! let server = DirectoryServer::builder()
//!     .bind("127.0.0.1:5555")
//!     .build()
//!     .await?;
//! tokio::spawn(server.run());
//!
//! // A client
//! let (out_tx, mut out_rx) = mpsc::unbounded_channel();
//! let (cmd_tx, cmd_rx) = mpsc::channel(16);
//! let session = ChatSession::create(&ClientConfig::default(), "lobby", "ana", out_tx).await?;
//! tokio::spawn(session.run(cmd_rx));
//! let _ = cmd_tx.send(UserCommand::Say("hello".into())).await;
//! # let _ = out_rx.recv().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod journal;
mod recovery;
mod server;
mod session;

pub use client::DirectoryClient;
pub use config::{ClientConfig, DEFAULT_DIRECTORY_ADDR, DirectoryConfig};
pub use error::ParleyError;
pub use journal::{Journal, Snapshot};
pub use recovery::reconcile;
pub use server::{DirectoryServer, DirectoryServerBuilder};
pub use session::{ChatSession, SessionEnd, SessionOutput, UserCommand};

pub mod prelude {
    pub use crate::{
        ChatSession, ClientConfig, DirectoryClient, DirectoryConfig, DirectoryServer, ParleyError,
        SessionEnd, SessionOutput, UserCommand,
    };
    pub use parley_protocol::{Member, MessageId, PeerDatagram, Status};
    pub use parley_session::{Delivery, SessionEvent};
}
