//! Startup liveness recovery.
//!
//! After a restart the journal says who *was* in each room, not who still
//! is. For every room we ask its listed members, one at a time and in
//! order, "are you still live in this room?". The first member to answer
//! tells us the room's current membership from its own point of view, and
//! that list replaces the stale one. A room where nobody answers in time is
//! dropped.

use std::time::Duration;

use parley_protocol::{Codec, Member, PeerDatagram};
use parley_room::RoomTable;
use parley_transport::{DatagramSocket, TransportError};

/// Probes every room in `table` and returns the reconciled table.
pub async fn reconcile(
    table: RoomTable,
    socket: &DatagramSocket,
    per_member: Duration,
    codec: &impl Codec,
) -> RoomTable {
    let mut live = RoomTable::new();
    for (room, members) in table {
        match probe_room(&room, &members, socket, per_member, codec).await {
            Some(active) if !active.is_empty() => {
                tracing::info!(%room, members = active.len(), "room confirmed live");
                live.insert(room, active);
            }
            _ => tracing::info!(%room, "no member answered, room dropped"),
        }
    }
    live
}

/// Asks each member in turn; returns the first answer.
async fn probe_room(
    room: &str,
    members: &[Member],
    socket: &DatagramSocket,
    per_member: Duration,
    codec: &impl Codec,
) -> Option<Vec<Member>> {
    let probe = PeerDatagram::RoomVerify {
        room: room.to_string(),
    };
    let bytes = match codec.encode(&probe) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(%room, error = %e, "failed to encode probe");
            return None;
        }
    };

    let mut asked = Vec::with_capacity(members.len());
    for &member in members {
        if asked.contains(&member) {
            continue;
        }
        asked.push(member);

        if let Err(e) = socket.send_to(&bytes, member.socket_addr()).await {
            tracing::debug!(%room, %member, error = %e, "probe send failed");
            continue;
        }
        match tokio::time::timeout(per_member, await_answer(socket, room, member, codec)).await {
            Ok(Ok(active)) => return Some(active),
            Ok(Err(e)) => tracing::debug!(%room, %member, error = %e, "probe receive failed"),
            Err(_) => tracing::debug!(%room, %member, "probe timed out"),
        }
    }
    None
}

/// Waits for `member`'s `room_verify_response` for `room`, ignoring
/// anything else that arrives meanwhile.
async fn await_answer(
    socket: &DatagramSocket,
    room: &str,
    member: Member,
    codec: &impl Codec,
) -> Result<Vec<Member>, TransportError> {
    loop {
        let (data, from) = socket.recv_from().await?;
        if Member::from(from) != member {
            tracing::debug!(%from, "stray datagram during recovery");
            continue;
        }
        match codec.decode::<PeerDatagram>(&data) {
            Ok(PeerDatagram::RoomVerifyResponse {
                room: answered,
                active_clients,
            }) if answered == room => return Ok(active_clients),
            Ok(other) => tracing::debug!(%from, kind = other.kind(), "unexpected datagram"),
            Err(e) => tracing::debug!(%from, error = %e, "undecodable datagram"),
        }
    }
}
