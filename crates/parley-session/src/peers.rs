//! The Peer Set Manager: who else is in my room right now.

use parley_protocol::Member;

/// The live address list of the client's current room, excluding the
/// client itself.
///
/// Members are compared by `(host, port)` only and kept in the order they
/// were first seen. Inserting a member that is already present is a no-op,
/// so replayed or duplicated `join` updates are harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
    members: Vec<Member>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the initial peer set from a directory member list, dropping
    /// `me` and any duplicates.
    pub fn from_members(members: impl IntoIterator<Item = Member>, me: Member) -> Self {
        let mut set = Self::new();
        for member in members {
            if member != me {
                set.insert(member);
            }
        }
        set
    }

    /// Adds `member` if absent. Returns `true` if it was added.
    pub fn insert(&mut self, member: Member) -> bool {
        if self.contains(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Removes `member`. Returns `true` if it was present.
    pub fn remove(&mut self, member: &Member) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member);
        self.members.len() != before
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.members.contains(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn to_vec(&self) -> Vec<Member> {
        self.members.clone()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn m(port: u16) -> Member {
        Member::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_from_members_drops_self_and_duplicates() {
        let set = PeerSet::from_members([m(1), m(2), m(1), m(3)], m(2));
        assert_eq!(set.to_vec(), vec![m(1), m(3)]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = PeerSet::new();
        assert!(set.insert(m(1)));
        assert!(!set.insert(m(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_same_port_different_host_is_a_different_member() {
        let mut set = PeerSet::new();
        set.insert(m(1));
        assert!(set.insert(Member::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 1)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut set = PeerSet::from_members([m(1), m(2)], m(9));
        assert!(set.remove(&m(1)));
        assert!(!set.remove(&m(1)));
        assert_eq!(set.to_vec(), vec![m(2)]);
    }

    #[test]
    fn test_clear_empties_the_set() {
        let mut set = PeerSet::from_members([m(1), m(2)], m(9));
        set.clear();
        assert!(set.is_empty());
    }
}
