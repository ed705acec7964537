//! State-transfer and clock-synchronization messages.

use lockstep_types::{EpochNum, GroupTime, Hash, PeerId, SeqNum};
use serde::{Deserialize, Serialize};

/// A lagging peer asks the leader for catch-up data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// The next sequence number the requester needs.
    pub expected_seq: SeqNum,

    /// Lowest sequence number already sitting in the requester's stash, if
    /// any; the responder need not stream past it.
    pub first_stashed_seq: Option<SeqNum>,
}

/// Sealed-epoch snapshot sent to a lagging peer.
///
/// The requester replaces its application state wholesale, then resumes the
/// normal stash/apply path for commands after `seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncData {
    /// Epoch the snapshot closes.
    pub epoch: EpochNum,

    /// Sequence number of the sealing checkpoint.
    pub seq: SeqNum,

    /// Group time of the sealing checkpoint.
    pub group_time: GroupTime,

    /// Advisory digest of the snapshot.
    pub state_hash: Hash,

    /// Serialized application state.
    pub state: Vec<u8>,
}

/// A catching-up peer reports that its applied sequence has reached what it
/// believes is current. Only then is it promoted toward Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCompletion {
    /// Highest sequence number applied.
    pub seq: SeqNum,

    /// Advisory digest of the application state at `seq`.
    pub hash: Hash,
}

/// Advisory checkpoint digest, unicast to the leader by every non-leader
/// peer when it seals an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReport {
    /// Sequence number of the checkpoint command.
    pub seq: SeqNum,

    /// Group time carried by the checkpoint command.
    pub group_time: GroupTime,

    /// Digest of the reporter's application state at `seq`.
    pub hash: Hash,
}

/// Periodic announcement of a peer's (group time − system time) offset.
///
/// A peer only announces once its own group clock is initialized; the first
/// announcement heard from a SyncingClock member doubles as that member's
/// clock-sync completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockOffset {
    /// The announcing peer.
    pub peer: PeerId,

    /// Milliseconds of group time ahead of the peer's system clock.
    pub offset_ms: i64,
}
