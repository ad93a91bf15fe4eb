//! The Clock & Recovery Engine.
//!
//! The engine is sans-IO: it never touches a socket. Every operation takes
//! an input (something the user typed, a datagram that arrived) and returns
//! the list of [`Action`]s the caller should carry out, in order. The
//! session loop owns the socket and does the sending.
//!
//! ```text
//!  user text ──→ compose() ──┐
//!                            ├──→ Vec<Action> ──→ Send / Deliver / Notify
//!  datagram  ──→ handle()  ──┘
//! ```
//!
//! # Recovery in one paragraph
//!
//! Each chat message carries the sender's whole [`PeerClock`]. When a
//! message shows that the sender (or a third peer it has heard from) is
//! further ahead than we have contiguously seen, and the gap opened after
//! we started tracking that peer, we send one `message_request` to the
//! peer that delivered the message. It replays what its [`MessageLog`]
//! still holds and finishes with `recovery_complete`, carrying its clock,
//! which we adopt. While any recovery is outstanding no new gap is chased.
//! A request counts as lost once the asked peer sends a newer message
//! without having answered; the gap is then looked for again.

use std::collections::BTreeMap;

use parley_protocol::{ClockVector, Member, MembershipUpdate, MessageId, PeerDatagram};

use crate::{
    JoinTimeClock, MessageLog, PeerClock, PeerSet, ReceivedMessageIds, SessionError,
};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Who an outgoing datagram is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every member of the current peer set.
    AllPeers,
    /// One specific address.
    Peer(Member),
}

/// A chat message ready to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: MessageId,
    pub user: String,
    pub body: String,
    /// `true` if it arrived through a recovery replay.
    pub recovered: bool,
}

/// Something the user should be told about that isn't a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MemberJoined { user: String, member: Member },
    MemberLeft { user: String, member: Member },
    /// A recovery finished but these sequence numbers from `peer` (a port)
    /// were not replayed. They are gone; the session carries on.
    UnrecoverableGap { peer: u16, missing: Vec<u64> },
}

/// One thing the caller must do on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send {
        to: Recipient,
        datagram: PeerDatagram,
    },
    Deliver(Delivery),
    Notify(SessionEvent),
}

// ---------------------------------------------------------------------------
// Recovery bookkeeping
// ---------------------------------------------------------------------------

/// A gap found in an incoming clock vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gap {
    /// Port whose counter is behind.
    author: u16,
    current: u64,
    reported: u64,
}

/// An outstanding `message_request`: we asked for `author`'s messages
/// `from + 1 ..= to`, when the peer we asked was at `asked_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecoveryWindow {
    author: u16,
    from: u64,
    to: u64,
    asked_at: u64,
}

// ---------------------------------------------------------------------------
// RecoveryEngine
// ---------------------------------------------------------------------------

/// All per-room state of one chat client.
pub struct RecoveryEngine {
    room: String,
    user: String,
    me: Member,
    peers: PeerSet,
    clock: PeerClock,
    join_clock: JoinTimeClock,
    log: MessageLog,
    received: ReceivedMessageIds,
    /// Peer port we asked → what we asked it for.
    recovering: BTreeMap<u16, RecoveryWindow>,
}

impl RecoveryEngine {
    /// Creates the engine for a client that has just entered `room` as
    /// `me`. `members` is the list the Directory Service returned; `me` is
    /// filtered out of it.
    pub fn new(
        room: impl Into<String>,
        user: impl Into<String>,
        me: Member,
        members: impl IntoIterator<Item = Member>,
    ) -> Self {
        let mut clock = PeerClock::new();
        clock.track(me.port, 0);
        Self {
            room: room.into(),
            user: user.into(),
            me,
            peers: PeerSet::from_members(members, me),
            clock,
            join_clock: JoinTimeClock::new(),
            log: MessageLog::new(),
            received: ReceivedMessageIds::new(),
            recovering: BTreeMap::new(),
        }
    }

    // ---- Accessors ----

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn me(&self) -> Member {
        self.me
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn clock(&self) -> &PeerClock {
        &self.clock
    }

    pub fn join_clock(&self) -> &JoinTimeClock {
        &self.join_clock
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn received(&self) -> &ReceivedMessageIds {
        &self.received
    }

    /// Whether we are waiting on a replay from the peer at `port`.
    pub fn is_recovering(&self, port: u16) -> bool {
        self.recovering.contains_key(&port)
    }

    /// Whether any replay is outstanding.
    pub fn recovery_in_progress(&self) -> bool {
        !self.recovering.is_empty()
    }

    /// Expands a [`Recipient`] into concrete addresses.
    pub fn resolve(&self, to: &Recipient) -> Vec<Member> {
        match to {
            Recipient::AllPeers => self.peers.to_vec(),
            Recipient::Peer(member) => vec![*member],
        }
    }

    // ---- Outgoing ----

    /// Tells everyone already in the room that we arrived.
    pub fn announce_join(&self) -> Vec<Action> {
        self.announce(PeerDatagram::Join(self.membership_update()))
    }

    /// Tells everyone in the room that we are leaving.
    pub fn announce_leave(&self) -> Vec<Action> {
        self.announce(PeerDatagram::Leave(self.membership_update()))
    }

    /// Stamps `body` with the next sequence number, logs it for replay and
    /// broadcasts it.
    pub fn compose(&mut self, body: impl Into<String>) -> Vec<Action> {
        let body = body.into();
        let seq = self.clock.advance(self.me.port);
        self.log.push(seq, self.user.clone(), body.clone());
        self.received.insert(MessageId::new(self.me.port, seq));
        tracing::debug!(room = %self.room, seq, "chat sent");

        vec![Action::Send {
            to: Recipient::AllPeers,
            datagram: PeerDatagram::Chat {
                user: self.user.clone(),
                body,
                message_clock: self.clock.vector(),
            },
        }]
    }

    // ---- Incoming ----

    /// Processes one datagram received from `from`.
    ///
    /// # Errors
    /// A [`SessionError`] means the datagram was inconsistent and has been
    /// ignored. Engine state is unchanged.
    pub fn handle(
        &mut self,
        from: Member,
        datagram: PeerDatagram,
    ) -> Result<Vec<Action>, SessionError> {
        tracing::debug!(%from, kind = datagram.kind(), "datagram received");
        match datagram {
            PeerDatagram::Join(update) => Ok(self.on_join(update)),
            PeerDatagram::Leave(update) => Ok(self.on_leave(update)),
            PeerDatagram::Chat {
                user,
                body,
                message_clock,
            } => self.on_chat(from, user, body, message_clock),
            PeerDatagram::MessageRequest {
                requesting_port,
                count,
                from_count,
            } => Ok(self.serve_recovery(from, requesting_port, count, from_count)),
            PeerDatagram::Recovery {
                user,
                body,
                message_id,
                sequence_number,
                ..
            } => self.on_recovery(user, body, message_id, sequence_number),
            PeerDatagram::RecoveryComplete {
                final_clock,
                sender_port,
            } => Ok(self.on_recovery_complete(final_clock, sender_port)),
            PeerDatagram::RoomVerify { room } => Ok(self.on_room_verify(from, room)),
            PeerDatagram::RoomVerifyResponse { .. } => {
                tracing::debug!(%from, "ignoring room_verify_response addressed to a client");
                Ok(Vec::new())
            }
        }
    }

    /// Discards every piece of room state.
    pub fn reset(&mut self) {
        self.peers.clear();
        self.clock.clear();
        self.join_clock.clear();
        self.log.clear();
        self.received.clear();
        self.recovering.clear();
    }

    // ---- Membership ----

    fn on_join(&mut self, update: MembershipUpdate) -> Vec<Action> {
        let member = update.subject();
        if update.room != self.room || member == self.me {
            return Vec::new();
        }
        if !self.peers.insert(member) {
            return Vec::new();
        }

        // Everything this peer sends from now on is ours to recover.
        self.clock.track(member.port, 0);
        self.join_clock.record(member.port, 0);
        tracing::info!(room = %self.room, %member, user = %update.member, "peer joined");
        vec![Action::Notify(SessionEvent::MemberJoined {
            user: update.member,
            member,
        })]
    }

    fn on_leave(&mut self, update: MembershipUpdate) -> Vec<Action> {
        let member = update.subject();
        if update.room != self.room || member == self.me {
            return Vec::new();
        }

        let was_peer = self.peers.remove(&member);
        self.forget_peer(member.port);
        if !was_peer {
            return Vec::new();
        }
        tracing::info!(room = %self.room, %member, user = %update.member, "peer left");
        vec![Action::Notify(SessionEvent::MemberLeft {
            user: update.member,
            member,
        })]
    }

    /// Stale peer state must not outlive the peer.
    fn forget_peer(&mut self, port: u16) {
        self.clock.forget(port);
        self.join_clock.forget(port);
        self.recovering.remove(&port);
        self.received.forget_port(port);
    }

    // ---- Chat ----

    fn on_chat(
        &mut self,
        from: Member,
        user: String,
        body: String,
        vector: ClockVector,
    ) -> Result<Vec<Action>, SessionError> {
        let sender = from.port;
        let seq = vector
            .get(&sender)
            .copied()
            .ok_or(SessionError::MissingSequence { port: sender })?;
        let id = MessageId::new(sender, seq);
        if self.received.contains(&id) {
            tracing::debug!(%id, "duplicate chat dropped");
            return Ok(Vec::new());
        }
        self.expire_unanswered(sender, seq);

        if !self.recovery_in_progress() {
            if let Some(gap) = self.find_gap(sender, &vector) {
                let mut actions = vec![self.request_recovery(from, gap, seq)];
                // A direct gap's replay includes this very message. A
                // third-party gap's replay does not, so show it now.
                if gap.author != sender {
                    self.received.insert(id);
                    actions.push(deliver(id, user, body, false));
                }
                return Ok(actions);
            }
        }

        self.clock.merge(&vector, self.me.port);
        self.anchor_unseen();
        self.received.insert(id);
        Ok(vec![deliver(id, user, body, false)])
    }

    /// Direct-sender gap first; otherwise the lowest third-party port that
    /// is behind. At most one gap is chased per message.
    fn find_gap(&self, sender: u16, vector: &ClockVector) -> Option<Gap> {
        let behind = |port: u16, reported: u64, slack: u64| -> Option<Gap> {
            let baseline = self.join_clock.get(port)?;
            let current = self.clock.count(port);
            (reported > current.saturating_add(slack) && reported > baseline).then_some(Gap {
                author: port,
                current,
                reported,
            })
        };

        let direct = vector
            .get(&sender)
            .and_then(|&reported| behind(sender, reported, 1));
        direct.or_else(|| {
            vector
                .iter()
                .filter(|&(&port, _)| port != sender && port != self.me.port)
                .find_map(|(&port, &reported)| behind(port, reported, 0))
        })
    }

    /// A peer we asked for a replay has since sent something newer, so
    /// our request or its answer was lost. Dropping the window lets the
    /// current message re-detect the gap and ask again.
    fn expire_unanswered(&mut self, sender: u16, seq: u64) {
        let Some(window) = self.recovering.get(&sender) else {
            return;
        };
        if seq <= window.asked_at {
            return;
        }
        tracing::warn!(
            peer = sender,
            author = window.author,
            asked_at = window.asked_at,
            seq,
            "recovery went unanswered, asking again"
        );
        self.recovering.remove(&sender);
    }

    fn request_recovery(&mut self, from: Member, gap: Gap, asked_at: u64) -> Action {
        let count = gap.reported - gap.current;
        self.recovering.insert(
            from.port,
            RecoveryWindow {
                author: gap.author,
                from: gap.current,
                to: gap.reported,
                asked_at,
            },
        );
        tracing::info!(
            peer = %from,
            author = gap.author,
            from_count = gap.current,
            count,
            "gap detected, requesting recovery"
        );
        Action::Send {
            to: Recipient::Peer(from),
            datagram: PeerDatagram::MessageRequest {
                requesting_port: self.me.port,
                count,
                from_count: gap.current,
            },
        }
    }

    /// Pins a join-time baseline for every port we have a count for but
    /// never saw join.
    fn anchor_unseen(&mut self) {
        for port in self.clock.ports() {
            if port != self.me.port {
                self.join_clock.record(port, self.clock.count(port));
            }
        }
    }

    // ---- Recovery: serving side ----

    fn serve_recovery(
        &self,
        from: Member,
        requesting_port: u16,
        count: u64,
        from_count: u64,
    ) -> Vec<Action> {
        let clock = self.clock.vector();
        let mut actions: Vec<Action> = self
            .log
            .range(from_count, count)
            .map(|entry| Action::Send {
                to: Recipient::Peer(from),
                datagram: PeerDatagram::Recovery {
                    user: entry.user.clone(),
                    body: entry.body.clone(),
                    message_clock: clock.clone(),
                    message_id: MessageId::new(self.me.port, entry.seq),
                    sequence_number: entry.seq,
                },
            })
            .collect();
        tracing::info!(
            peer = %from,
            requesting_port,
            from_count,
            count,
            replayed = actions.len(),
            "serving recovery"
        );

        actions.push(Action::Send {
            to: Recipient::Peer(from),
            datagram: PeerDatagram::RecoveryComplete {
                final_clock: clock,
                sender_port: self.me.port,
            },
        });
        actions
    }

    // ---- Recovery: requesting side ----

    fn on_recovery(
        &mut self,
        user: String,
        body: String,
        id: MessageId,
        sequence_number: u64,
    ) -> Result<Vec<Action>, SessionError> {
        if id.seq != sequence_number {
            return Err(SessionError::InconsistentRecovery {
                id,
                sequence_number,
            });
        }
        if !self.received.insert(id) {
            tracing::debug!(%id, "duplicate recovery dropped");
            return Ok(Vec::new());
        }
        if self.join_clock.get(id.port).is_some_and(|baseline| id.seq <= baseline) {
            tracing::debug!(%id, "replayed message predates our membership");
            return Ok(Vec::new());
        }
        Ok(vec![deliver(id, user, body, true)])
    }

    fn on_recovery_complete(&mut self, final_clock: ClockVector, sender_port: u16) -> Vec<Action> {
        let Some(window) = self.recovering.remove(&sender_port) else {
            tracing::debug!(sender_port, "unsolicited recovery_complete ignored");
            return Vec::new();
        };

        self.clock.merge(&final_clock, self.me.port);
        self.anchor_unseen();

        let missing: Vec<u64> = (window.from + 1..=window.to)
            .filter(|&seq| !self.received.contains(&MessageId::new(window.author, seq)))
            .collect();
        tracing::info!(sender_port, author = window.author, "recovery complete");
        if missing.is_empty() {
            return Vec::new();
        }

        tracing::warn!(
            author = window.author,
            missing = missing.len(),
            "messages lost beyond recovery"
        );
        vec![Action::Notify(SessionEvent::UnrecoverableGap {
            peer: window.author,
            missing,
        })]
    }

    // ---- Liveness probe ----

    fn on_room_verify(&self, from: Member, room: String) -> Vec<Action> {
        if room != self.room {
            tracing::debug!(%from, %room, "room_verify for another room ignored");
            return Vec::new();
        }
        let mut active_clients = Vec::with_capacity(self.peers.len() + 1);
        active_clients.push(self.me);
        active_clients.extend(self.peers.iter().copied());
        vec![Action::Send {
            to: Recipient::Peer(from),
            datagram: PeerDatagram::RoomVerifyResponse {
                room,
                active_clients,
            },
        }]
    }

    // ---- Helpers ----

    fn membership_update(&self) -> MembershipUpdate {
        MembershipUpdate::new(self.room.clone(), self.user.clone(), self.me)
    }

    fn announce(&self, datagram: PeerDatagram) -> Vec<Action> {
        if self.peers.is_empty() {
            return Vec::new();
        }
        vec![Action::Send {
            to: Recipient::AllPeers,
            datagram,
        }]
    }
}

fn deliver(id: MessageId, user: String, body: String, recovered: bool) -> Action {
    Action::Deliver(Delivery {
        id,
        user,
        body,
        recovered,
    })
}
