//! Core types for the lockstep group-agreement protocol.
//!
//! These types are shared by every crate in the workspace and carry no
//! behavior beyond their own invariants. Protocol logic lives in
//! `lockstep-group` and its component crates.

mod command;
mod epoch;
mod group_info;
mod hash;
mod identifiers;
mod member;

pub use command::{Command, CommandPayload};
pub use epoch::{Epoch, LeaderTerm};
pub use group_info::GroupInfo;
pub use hash::{Hash, HexError};
pub use identifiers::{EpochNum, GroupId, GroupTime, PeerId, SeqNum};
pub use member::{Member, MemberStatus};
