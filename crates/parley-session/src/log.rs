//! The client's own recently sent messages, kept for replay.

use std::collections::VecDeque;

/// How many of its own messages a client can replay.
pub const LOG_CAPACITY: usize = 20;

/// One message this client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    pub seq: u64,
    pub user: String,
    pub body: String,
}

/// Bounded log of this client's own outgoing messages, oldest evicted
/// first. It is the only material the client can replay when a peer asks
/// for messages it missed; anything older has been evicted and is gone.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<LoggedMessage>,
    capacity: usize,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sent message, evicting the oldest entry when full.
    pub fn push(&mut self, seq: u64, user: impl Into<String>, body: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LoggedMessage {
            seq,
            user: user.into(),
            body: body.into(),
        });
    }

    /// Messages with `from_count < seq <= from_count + count`, oldest first.
    /// Only what the log still retains is returned.
    pub fn range(&self, from_count: u64, count: u64) -> impl Iterator<Item = &LoggedMessage> {
        let upto = from_count.saturating_add(count);
        self.entries
            .iter()
            .filter(move |entry| entry.seq > from_count && entry.seq <= upto)
    }

    /// Lowest sequence number still retained.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: u64) -> MessageLog {
        let mut log = MessageLog::new();
        for seq in 1..=n {
            log.push(seq, "ann", format!("m{seq}"));
        }
        log
    }

    fn seqs<'a>(it: impl Iterator<Item = &'a LoggedMessage>) -> Vec<u64> {
        it.map(|entry| entry.seq).collect()
    }

    #[test]
    fn test_range_is_exclusive_of_from_count() {
        let log = filled(5);
        assert_eq!(seqs(log.range(2, 3)), vec![3, 4, 5]);
    }

    #[test]
    fn test_range_clamps_to_what_exists() {
        let log = filled(5);
        assert_eq!(seqs(log.range(3, 10)), vec![4, 5]);
        assert!(log.range(5, 1).next().is_none());
    }

    #[test]
    fn test_oldest_entries_are_evicted_at_capacity() {
        let log = filled(30);
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log.oldest_seq(), Some(11));
        assert_eq!(seqs(log.range(0, 30)), (11..=30).collect::<Vec<_>>());
    }

    #[test]
    fn test_range_keeps_body() {
        let log = filled(3);
        let entry = log.range(1, 1).next().unwrap();
        assert_eq!(entry.body, "m2");
        assert_eq!(entry.user, "ann");
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut log = MessageLog::with_capacity(0);
        log.push(1, "ann", "x");
        assert!(log.is_empty());
    }
}
