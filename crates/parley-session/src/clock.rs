//! Per-peer message counters.
//!
//! # What the two clocks are for
//!
//! Every chat message carries its author's sequence number. If you have
//! seen messages 1, 2 from a peer and the next one says 5, messages 3 and 4
//! went missing in transit. [`PeerClock`] holds, for each peer port, the
//! highest count received without a gap.
//!
//! A gap is only worth repairing if it opened *after* this client entered
//! the room. [`JoinTimeClock`] remembers, per port, the count at which this
//! client started tracking that peer. Losses at or below that baseline
//! happened before we were there and are not our problem.

use parley_protocol::ClockVector;

// ---------------------------------------------------------------------------
// PeerClock
// ---------------------------------------------------------------------------

/// Peer port → highest contiguous sequence number seen from that peer.
///
/// The client's own port lives here too: it is the client's outgoing
/// sequence counter. Merges never touch that entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerClock {
    counts: ClockVector,
}

impl PeerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the count for `port`, if the port is known.
    pub fn get(&self, port: u16) -> Option<u64> {
        self.counts.get(&port).copied()
    }

    /// Returns the count for `port`, or 0 for an unknown port.
    pub fn count(&self, port: u16) -> u64 {
        self.get(port).unwrap_or(0)
    }

    /// Sets `port` to `count` unless the port already has an entry.
    pub fn track(&mut self, port: u16, count: u64) {
        self.counts.entry(port).or_insert(count);
    }

    /// Increments the entry for `own_port` and returns the new value: the
    /// sequence number of the message about to be sent.
    pub fn advance(&mut self, own_port: u16) -> u64 {
        let count = self.counts.entry(own_port).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Merges a received clock vector, last writer wins per key.
    ///
    /// The entry for `own_port` is never overwritten: nobody else gets to
    /// decide what our next sequence number is.
    pub fn merge(&mut self, vector: &ClockVector, own_port: u16) {
        for (&port, &count) in vector {
            if port != own_port {
                self.counts.insert(port, count);
            }
        }
    }

    /// Drops everything known about `port`.
    pub fn forget(&mut self, port: u16) {
        self.counts.remove(&port);
    }

    /// Ports with an entry, ascending.
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.counts.keys().copied()
    }

    /// Returns a full copy, ready to attach to an outgoing datagram.
    pub fn vector(&self) -> ClockVector {
        self.counts.clone()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

// ---------------------------------------------------------------------------
// JoinTimeClock
// ---------------------------------------------------------------------------

/// Peer port → the count at which this client began tracking that peer.
///
/// Each entry is written once and then left alone until the peer leaves.
/// A peer that joins after us starts at 0. A peer that was already in the
/// room is pinned at the first count we observe for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinTimeClock {
    baselines: ClockVector,
}

impl JoinTimeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count` as the baseline for `port`. Returns `false` (and
    /// changes nothing) if the port already has one.
    pub fn record(&mut self, port: u16, count: u64) -> bool {
        if self.baselines.contains_key(&port) {
            return false;
        }
        self.baselines.insert(port, count);
        true
    }

    pub fn get(&self, port: u16) -> Option<u64> {
        self.baselines.get(&port).copied()
    }

    pub fn forget(&mut self, port: u16) {
        self.baselines.remove(&port);
    }

    pub fn clear(&mut self) {
        self.baselines.clear();
    }
}
