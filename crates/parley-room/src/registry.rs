//! The room registry: room name → ordered member list.
//!
//! All mutation goes through one write lock, so two concurrent joins to
//! the same room can never lose each other's update. `list` takes the
//! read side and may run alongside other readers, but never in the
//! middle of a mutation.
//!
//! Every committed mutation is handed to the registry's [`SnapshotSink`]
//! while the write lock is still held, so the order snapshots are recorded
//! in is exactly the order mutations happened in.

use std::collections::BTreeMap;

use parley_protocol::Member;
use tokio::sync::RwLock;

use crate::{RoomError, RoomTable, SnapshotSink};

/// Authoritative room table of the Directory Service.
///
/// Members are kept in insertion order. Duplicate insertion is tolerated
/// (a member that joins twice is listed twice); `leave` removes one
/// occurrence at a time.
pub struct RoomRegistry {
    rooms: RwLock<RoomTable>,
    sink: Option<Box<dyn SnapshotSink>>,
}

impl RoomRegistry {
    /// Creates an empty registry that records nothing.
    pub fn new() -> Self {
        Self::with_rooms(RoomTable::new())
    }

    /// Creates a registry pre-populated with `rooms` (e.g. after recovery).
    pub fn with_rooms(rooms: RoomTable) -> Self {
        Self {
            rooms: RwLock::new(rooms),
            sink: None,
        }
    }

    /// Attaches a sink that receives a full snapshot after every mutation.
    pub fn with_sink(mut self, sink: impl SnapshotSink) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Registers `name` with `member` as its only member.
    ///
    /// # Errors
    /// [`RoomError::InvalidName`] for an empty name,
    /// [`RoomError::AlreadyExists`] if the name is taken.
    pub async fn create_room(&self, name: &str, member: Member) -> Result<(), RoomError> {
        if name.is_empty() {
            return Err(RoomError::InvalidName);
        }

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Err(RoomError::AlreadyExists(name.to_string()));
        }
        rooms.insert(name.to_string(), vec![member]);
        tracing::info!(room = name, %member, "room created");
        self.commit(&rooms);
        Ok(())
    }

    /// Appends `member` to `name` and returns the full member list,
    /// the new member last.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the room is absent.
    pub async fn join_room(&self, name: &str, member: Member) -> Result<Vec<Member>, RoomError> {
        let mut rooms = self.rooms.write().await;
        let members = rooms
            .get_mut(name)
            .ok_or_else(|| RoomError::NotFound(name.to_string()))?;
        members.push(member);
        let snapshot = members.clone();
        tracing::info!(room = name, %member, members = snapshot.len(), "member joined");
        self.commit(&rooms);
        Ok(snapshot)
    }

    /// Removes the first occurrence of `member` from `name`. The room is
    /// deleted once its last member is gone.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the room is absent,
    /// [`RoomError::MemberNotFound`] if the member isn't listed.
    pub async fn leave_room(&self, name: &str, member: Member) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let members = rooms
            .get_mut(name)
            .ok_or_else(|| RoomError::NotFound(name.to_string()))?;
        let index = members
            .iter()
            .position(|m| *m == member)
            .ok_or_else(|| RoomError::MemberNotFound {
                room: name.to_string(),
                member,
            })?;
        members.remove(index);
        let remaining = members.len();
        tracing::info!(room = name, %member, members = remaining, "member left");

        if remaining == 0 {
            rooms.remove(name);
            tracing::info!(room = name, "room deleted");
        }
        self.commit(&rooms);
        Ok(())
    }

    /// Returns room name → member count for every room.
    ///
    /// Addresses are deliberately left out.
    pub async fn list_rooms(&self) -> BTreeMap<String, usize> {
        self.rooms
            .read()
            .await
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }

    /// Replaces the member list of `name` wholesale. An empty list deletes
    /// the room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the room is absent.
    pub async fn update_room(
        &self,
        name: &str,
        active_members: Vec<Member>,
    ) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        if !rooms.contains_key(name) {
            return Err(RoomError::NotFound(name.to_string()));
        }

        if active_members.is_empty() {
            rooms.remove(name);
            tracing::info!(room = name, "room deleted by update");
        } else {
            tracing::info!(room = name, members = active_members.len(), "room updated");
            rooms.insert(name.to_string(), active_members);
        }
        self.commit(&rooms);
        Ok(())
    }

    /// Replaces the whole table (startup recovery). Recorded like any
    /// other mutation.
    pub async fn replace_all(&self, table: RoomTable) {
        let mut rooms = self.rooms.write().await;
        *rooms = table;
        tracing::info!(rooms = rooms.len(), "room table replaced");
        self.commit(&rooms);
    }

    /// Returns the members of `name`, if it exists.
    pub async fn members(&self, name: &str) -> Option<Vec<Member>> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Returns a full copy of the table.
    pub async fn snapshot(&self) -> RoomTable {
        self.rooms.read().await.clone()
    }

    /// Returns the number of registered rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Hands the post-mutation table to the sink. Must be called with the
    /// write lock held. A failing sink is logged; the mutation stands.
    fn commit(&self, rooms: &RoomTable) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(rooms) {
                tracing::error!(error = %e, "failed to record room snapshot");
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
