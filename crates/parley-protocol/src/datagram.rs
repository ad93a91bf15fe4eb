//! Peer datagram protocol: everything that travels over the unreliable
//! transport, between peers and between the Directory Service and peers.
//!
//! Every datagram is one self-contained JSON object. There are no
//! acknowledgements; loss is repaired only by the recovery exchange
//! (`message_request` → `recovery`* → `recovery_complete`).

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::{ClockVector, Member, MessageId};

/// Marker carried in the `status` field of membership updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    #[default]
    Update,
}

/// Body of a `join`/`leave` membership update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    pub status: UpdateStatus,
    pub room: String,
    /// Display name of the member that joined or left.
    pub member: String,
    pub address: IpAddr,
    pub port: u16,
}

impl MembershipUpdate {
    pub fn new(room: impl Into<String>, user: impl Into<String>, member: Member) -> Self {
        Self {
            status: UpdateStatus::Update,
            room: room.into(),
            member: user.into(),
            address: member.host,
            port: member.port,
        }
    }

    /// The address of the member this update is about.
    pub fn subject(&self) -> Member {
        Member::new(self.address, self.port)
    }
}

/// A datagram exchanged over the unreliable transport.
///
/// `#[serde(tag = "type")]` flattens the variant name into the object,
/// e.g. `{ "type": "chat", "user": "ann", "body": "hi", "message_clock": {...} }`.
/// Any unknown `type` fails to decode and the datagram is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerDatagram {
    /// A member joined the room.
    Join(MembershipUpdate),

    /// A member left the room.
    Leave(MembershipUpdate),

    /// A chat message. The sender's sequence number for this message is
    /// the entry for the sender's own port in `message_clock`.
    Chat {
        user: String,
        body: String,
        message_clock: ClockVector,
    },

    /// "Replay your messages after `from_count`, `count` of them."
    MessageRequest {
        requesting_port: u16,
        count: u64,
        from_count: u64,
    },

    /// One replayed message, answering a `message_request`.
    Recovery {
        user: String,
        body: String,
        message_clock: ClockVector,
        message_id: MessageId,
        sequence_number: u64,
    },

    /// Terminates a replay; carries the replaying peer's full clock.
    RecoveryComplete {
        final_clock: ClockVector,
        sender_port: u16,
    },

    /// Directory Service → member: "are you still live in `room`?"
    RoomVerify { room: String },

    /// Member → Directory Service: the member's own view of the room.
    RoomVerifyResponse {
        room: String,
        active_clients: Vec<Member>,
    },
}

impl PeerDatagram {
    /// The wire name of this datagram's type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Chat { .. } => "chat",
            Self::MessageRequest { .. } => "message_request",
            Self::Recovery { .. } => "recovery",
            Self::RecoveryComplete { .. } => "recovery_complete",
            Self::RoomVerify { .. } => "room_verify",
            Self::RoomVerifyResponse { .. } => "room_verify_response",
        }
    }
}
