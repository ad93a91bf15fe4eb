//! Error types for the room layer.

use parley_protocol::Member;

/// Errors that can occur during registry operations.
///
/// These are business-logic outcomes, not faults: the Directory Service
/// turns each one into a `failure` (or `error`) response for the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} does not exist")]
    NotFound(String),

    /// `create` named a room that is already registered. Existing rooms are
    /// never overwritten.
    #[error("room {0} already exists")]
    AlreadyExists(String),

    /// The member is not listed in the room.
    #[error("{member} is not a member of room {room}")]
    MemberNotFound { room: String, member: Member },

    /// The room name is empty.
    #[error("room name must not be empty")]
    InvalidName,
}
