//! Sequenced commands, the unit of group agreement.

use crate::{EpochNum, GroupTime, SeqNum};
use serde::{Deserialize, Serialize};

/// What a command instructs every peer to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Opaque application payload, handed to the app core unchanged.
    App(Vec<u8>),

    /// Seal the current epoch: every peer checkpoints its app state at this
    /// sequence number. Issued only by the leader.
    Checkpoint {
        /// Group time at which the leader requested the checkpoint.
        group_time: GroupTime,
    },
}

impl CommandPayload {
    /// Human-readable payload kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandPayload::App(_) => "App",
            CommandPayload::Checkpoint { .. } => "Checkpoint",
        }
    }
}

/// A sequence-numbered, totally ordered instruction applied identically by
/// every peer.
///
/// Sequence numbers are assigned only by the current leader and never repeat
/// or reset; a new leader resumes at the last applied number plus one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Epoch open when the command was issued.
    pub epoch: EpochNum,

    /// Position in the total order.
    pub seq: SeqNum,

    /// The instruction itself.
    pub payload: CommandPayload,
}

impl Command {
    /// Create an application command.
    pub fn app(epoch: EpochNum, seq: SeqNum, payload: Vec<u8>) -> Self {
        Self {
            epoch,
            seq,
            payload: CommandPayload::App(payload),
        }
    }

    /// Create a checkpoint command sealing the given epoch.
    pub fn checkpoint(epoch: EpochNum, seq: SeqNum, group_time: GroupTime) -> Self {
        Self {
            epoch,
            seq,
            payload: CommandPayload::Checkpoint { group_time },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kinds() {
        let a = Command::app(EpochNum(0), SeqNum(3), vec![1, 2]);
        let c = Command::checkpoint(EpochNum(0), SeqNum(4), GroupTime(100));
        assert_eq!(a.payload.kind(), "App");
        assert_eq!(c.payload.kind(), "Checkpoint");
    }
}
