//! Directory protocol: one request, one response, over a reliable stream.
//!
//! A client opens a connection, writes a single [`DirectoryRequest`],
//! reads a single [`DirectoryResponse`], and the server closes the
//! connection. There is no session beyond that pair.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::Member;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request sent to the Directory Service.
///
/// `#[serde(tag = "action")]` produces the flat form the protocol uses:
/// `{ "action": "join", "room": "lobby" }`. An unknown `action` fails to
/// decode, which the server answers with an `error` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DirectoryRequest {
    /// List every room with its member count.
    List,

    /// Create `room` with the requesting connection as its only member.
    Create { room: String },

    /// Append the requesting connection to `room`.
    Join { room: String },

    /// Remove the given member from `room`.
    ///
    /// The address is explicit because the leave request usually arrives
    /// on a different connection (and ephemeral port) than the join did.
    Leave {
        room: String,
        original_address: IpAddr,
        original_port: u16,
    },

    /// Replace the member list of `room` with an authoritative one.
    UpdateRoom {
        room: String,
        active_clients: Vec<Member>,
    },
}

impl DirectoryRequest {
    /// The wire name of this request's action, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create { .. } => "create",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::UpdateRoom { .. } => "update_room",
        }
    }

    /// The room this request targets, if any.
    pub fn room(&self) -> Option<&str> {
        match self {
            Self::List => None,
            Self::Create { room }
            | Self::Join { room }
            | Self::Leave { room, .. }
            | Self::UpdateRoom { room, .. } => Some(room),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Outcome class carried by every directory response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The operation was applied.
    Success,
    /// The request was well-formed but refused (room or member missing,
    /// room already exists).
    Failure,
    /// The request itself was unusable (malformed payload, empty room name).
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The single response the Directory Service writes before closing.
///
/// Optional fields are omitted from the JSON entirely when absent, so a
/// `leave` response is just `{ "status": "success", "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryResponse {
    pub status: Status,

    /// Human-readable explanation, shown to the user as-is.
    pub message: String,

    /// Ordered member list (`join`, and `create` with just the creator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ips: Option<Vec<Member>>,

    /// Room name → member count (`list`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<BTreeMap<String, usize>>,
}

impl DirectoryResponse {
    fn with_status(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ips: None,
            rooms: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status(Status::Success, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_status(Status::Failure, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(Status::Error, message)
    }

    /// Attaches an ordered member list.
    pub fn with_ips(mut self, ips: Vec<Member>) -> Self {
        self.ips = Some(ips);
        self
    }

    /// Attaches a room listing.
    pub fn with_rooms(mut self, rooms: BTreeMap<String, usize>) -> Self {
        self.rooms = Some(rooms);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
