//! Unified error type for Parley.

use parley_protocol::{ProtocolError, Status};
use parley_room::RoomError;
use parley_session::SessionError;
use parley_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// Connecting, sending or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A peer datagram was inconsistent.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A registry operation was refused.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The Directory Service answered, but not with `success`.
    #[error("directory said {status}: {message}")]
    Rejected { status: Status, message: String },

    /// Reading or writing the snapshot journal failed.
    #[error("journal: {0}")]
    Journal(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Transport(_)));
        assert!(parley_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::MissingSequence { port: 1 };
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Session(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound("r1".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Room(_)));
    }

    #[test]
    fn test_rejected_display_carries_status_and_message() {
        let err = ParleyError::Rejected {
            status: Status::Failure,
            message: "Room r1 not found".into(),
        };
        assert_eq!(err.to_string(), "directory said failure: Room r1 not found");
    }
}
