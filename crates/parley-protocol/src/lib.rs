//! Wire protocol for Parley.
//!
//! This crate defines the "language" that clients, peers and the
//! Directory Service speak:
//!
//! - **Types** ([`Member`], [`MessageId`], [`ClockVector`]): identity
//!   and clock values shared by both message families.
//! - **Directory messages** ([`DirectoryRequest`], [`DirectoryResponse`]):
//!   the request/response pair carried over a reliable stream.
//! - **Peer datagrams** ([`PeerDatagram`]): membership updates, chat,
//!   recovery, and liveness probes carried over the unreliable transport.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the room
//! registry / peer engines. It doesn't know about sockets or rooms; it
//! only knows how messages look.
//!
//! ```text
//! Transport (bytes) → Protocol (DirectoryRequest / PeerDatagram) → Registry / Engine
//! ```

mod codec;
mod datagram;
mod directory;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use datagram::{MembershipUpdate, PeerDatagram, UpdateStatus};
pub use directory::{DirectoryRequest, DirectoryResponse, Status};
pub use error::ProtocolError;
pub use types::{ClockVector, Member, MessageId};

/// Upper bound on a single directory request or peer datagram, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
