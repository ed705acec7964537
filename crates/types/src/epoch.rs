//! Epoch records and scheduled leadership terms.

use crate::{EpochNum, GroupTime, Hash, PeerId, SeqNum};
use serde::{Deserialize, Serialize};

/// A sealed interval of the command stream, bounded by two checkpoints.
///
/// Immutable once sealed. The serialized snapshot lets a late joiner replace
/// its application state wholesale instead of replaying from the beginning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    /// Epoch number.
    pub num: EpochNum,

    /// First sequence number covered by this epoch.
    pub start_seq: SeqNum,

    /// Sequence number of the checkpoint command that sealed it.
    pub end_seq: SeqNum,

    /// Group time carried by the sealing checkpoint command.
    pub sealed_at: GroupTime,

    /// Advisory digest of the application state at `end_seq`.
    pub end_state_hash: Hash,

    /// Serialized application state at `end_seq`.
    pub snapshot: Vec<u8>,
}

/// A scheduled leadership assignment.
///
/// Leadership transfers at a future epoch boundary so command ordering stays
/// well-defined across the handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderTerm {
    /// The peer that will lead.
    pub leader: PeerId,

    /// Monotonic term number.
    pub term: u64,

    /// Epoch at whose start the assignment takes effect.
    pub effective_epoch: EpochNum,
}

