//! Error types for the session layer.

use parley_protocol::MessageId;

/// A peer datagram the engine could not make sense of.
///
/// None of these are fatal. The session loop logs them and drops the
/// offending datagram; the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A chat message whose clock vector has no entry for its own sender,
    /// so it carries no sequence number.
    #[error("chat from port {port} carries no sequence number")]
    MissingSequence { port: u16 },

    /// A replayed message whose id disagrees with its sequence number.
    #[error("recovery message {id} claims sequence number {sequence_number}")]
    InconsistentRecovery { id: MessageId, sequence_number: u64 },
}
