//! Ids of messages already handed to the user.

use std::collections::HashSet;

use parley_protocol::MessageId;

/// Every message id this client has delivered, across both the normal and
/// the recovery path. A message whose id is in here is never delivered
/// again.
///
/// The set is unbounded. Entries only go away when their author leaves the
/// room or the session ends.
#[derive(Debug, Clone, Default)]
pub struct ReceivedMessageIds {
    ids: HashSet<MessageId>,
}

impl ReceivedMessageIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id`. Returns `true` if it was new.
    pub fn insert(&mut self, id: MessageId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Drops every id authored from `port`.
    pub fn forget_port(&mut self, port: u16) {
        self.ids.retain(|id| id.port != port);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
