//! Identity types shared by the directory and peer protocols.
//!
//! These are the nouns of the wire format: who a participant is
//! ([`Member`]), how one chat message is named ([`MessageId`]), and the
//! per-peer counters a chat message carries ([`ClockVector`]).

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// A room participant, identified purely by its datagram address.
///
/// There is no identity beyond `(host, port)`: a client that comes back
/// from a new ephemeral port is a new `Member`. Making that explicit here
/// (instead of passing raw `SocketAddr`s around) keeps the invariant
/// visible in every signature that deals with membership.
///
/// On the wire a member is a two-element array, `["127.0.0.1", 5000]`,
/// via serde's `from`/`into` conversion through a tuple.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "(IpAddr, u16)", into = "(IpAddr, u16)")]
pub struct Member {
    /// The IP address the member's datagrams come from.
    pub host: IpAddr,
    /// The member's datagram port. Peer clocks are keyed by this value.
    pub port: u16,
}

impl Member {
    /// Creates a member from its parts.
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    /// Returns the address datagrams for this member should be sent to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// IPv4-mapped IPv6 sources (`[::ffff:a.b.c.d]`, as seen on a dual-stack
/// socket) become the plain IPv4 member, matching how the directory
/// records them.
impl From<SocketAddr> for Member {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_canonical(), addr.port())
    }
}

impl From<(IpAddr, u16)> for Member {
    fn from((host, port): (IpAddr, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<Member> for (IpAddr, u16) {
    fn from(member: Member) -> Self {
        (member.host, member.port)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr's Display brackets IPv6 hosts for us.
        write!(f, "{}", self.socket_addr())
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Unique name of one chat message: the author's port plus the author's
/// sequence number for that message.
///
/// Serialized as the string `"<port>:<seq>"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId {
    /// Datagram port of the message's author.
    pub port: u16,
    /// The author's sequence number for this message (1-based).
    pub seq: u64,
}

impl MessageId {
    pub fn new(port: u16, seq: u64) -> Self {
        Self { port, seq }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.port, self.seq)
    }
}

impl FromStr for MessageId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidMessage(format!("bad message id {s:?}"));
        let (port, seq) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            port: port.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for MessageId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// ClockVector
// ---------------------------------------------------------------------------

/// A full copy of a client's peer clock: peer port → highest contiguous
/// sequence number seen from that peer.
///
/// `BTreeMap` keeps the ports sorted, which makes the recovery engine's
/// scan order (and therefore its tie-break between gaps) deterministic.
/// JSON object keys are strings, so port `5000` travels as `"5000"`;
/// `serde_json` converts integer map keys in both directions.
pub type ClockVector = BTreeMap<u16, u64>;
