//! Snapshot recording seam.

use std::collections::BTreeMap;

use parley_protocol::Member;

/// The full room table: room name → ordered member list.
pub type RoomTable = BTreeMap<String, Vec<Member>>;

/// Receives a full copy of the room table after every committed mutation.
///
/// The registry calls [`record`](Self::record) while it still holds its
/// write lock, so implementations see snapshots in mutation order and
/// must not call back into the registry. `record` is synchronous and
/// runs on an async worker thread, so it should stay a small append:
/// every directory request waits on that lock while it runs. The
/// Directory Service plugs its append-only journal in here.
pub trait SnapshotSink: Send + Sync + 'static {
    /// Records one snapshot.
    ///
    /// # Errors
    /// Any I/O error. The registry logs it and keeps the mutation.
    fn record(&self, rooms: &RoomTable) -> std::io::Result<()>;
}
