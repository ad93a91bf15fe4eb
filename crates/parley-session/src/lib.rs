//! Per-client room state for Parley.
//!
//! Everything a chat client knows about its current room lives here:
//!
//! 1. **Peer set** ([`PeerSet`]): the addresses of everyone else in the room
//! 2. **Clocks** ([`PeerClock`], [`JoinTimeClock`]): per-peer message counts
//!    used to spot lost messages
//! 3. **Replay material** ([`MessageLog`]): the client's own last 20 messages
//! 4. **Dedup** ([`ReceivedMessageIds`]): what has already been shown
//! 5. **The engine** ([`RecoveryEngine`]): ties the above together and turns
//!    inputs into [`Action`]s
//!
//! # How it fits in the stack
//!
//! ```text
//! parley (above)           ← session loop: owns the socket, performs Actions
//!     ↕
//! Session Layer (this crate)  ← pure state machine, no I/O
//!     ↕
//! Protocol Layer (below)   ← PeerDatagram, Member, MessageId, ClockVector
//! ```
//!
//! Nothing in this crate is async or locked. The session loop is the only
//! owner of a [`RecoveryEngine`] and drives it one event at a time.

mod clock;
mod dedup;
mod engine;
mod error;
mod log;
mod peers;

pub use clock::{JoinTimeClock, PeerClock};
pub use dedup::ReceivedMessageIds;
pub use engine::{Action, Delivery, Recipient, RecoveryEngine, SessionEvent};
pub use error::SessionError;
pub use log::{LOG_CAPACITY, LoggedMessage, MessageLog};
pub use peers::PeerSet;
