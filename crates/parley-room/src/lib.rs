//! Room registry for the Parley Directory Service.
//!
//! A room is a named rendezvous group; the registry maps each room name to
//! its ordered list of member addresses and is the only authoritative copy
//! of that mapping.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: create/join/leave/list/update, linearized by one
//!   mutation lock
//! - [`SnapshotSink`]: where committed table snapshots go (the journal)
//! - [`RoomTable`]: the full name → members table
//! - [`RoomError`]: business-logic failures

mod error;
mod registry;
mod snapshot;

pub use error::RoomError;
pub use registry::RoomRegistry;
pub use snapshot::{RoomTable, SnapshotSink};
