//! Byte encoding of wire messages.
//!
//! The Directory Service and the session loop both go through [`Codec`],
//! never through `serde_json` directly. [`JsonCodec`] is the only
//! implementation and matches the textual format both protocols use.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Turns wire messages into bytes and back.
///
/// `Send + Sync + 'static` so one codec can sit in the directory's shared
/// state and serve every connection task. Decoded values own their data,
/// so a receive buffer can be reused right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// [`ProtocolError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// [`ProtocolError::Decode`] for bytes that are not a valid `T`,
    /// including an unknown `action` or `type` tag.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is what every Parley participant speaks: directory requests and
/// responses, peer datagrams, and the snapshot journal lines. It is
/// human-readable, so a datagram captured with `tcpdump` can be read as-is.
///
/// Requires the `json` feature (on by default).
///
/// ## Example
///
/// ```rust
/// use parley_protocol::{Codec, DirectoryRequest, JsonCodec};
///
/// let codec = JsonCodec;
/// let request = DirectoryRequest::Join { room: "lobby".into() };
///
/// let bytes = codec.encode(&request).unwrap();
/// let decoded: DirectoryRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
