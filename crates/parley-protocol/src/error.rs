//! Error types for the protocol layer.
//!
//! Each crate in Parley defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were wrong (could not be encoded,
//! could not be decoded, or decoded into something that breaks a protocol
//! rule), never that the network or the room registry misbehaved.

/// Errors that can occur while encoding or decoding wire messages.
///
/// On the directory side every variant is answered with an `error`
/// status response; on the datagram side the offending datagram is
/// logged and dropped. Neither side ever crashes on one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: malformed JSON, missing required fields, an unknown
    /// `action`/`type` tag, or a member address that isn't an IP.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but violates a protocol rule, e.g. a chat
    /// datagram whose clock vector omits the sender's own port.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The payload exceeds the maximum accepted size.
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}
