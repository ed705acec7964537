//! Command-ordering messages: pre-ordering traffic, sequenced commands,
//! leader liveness and handover.

use lockstep_types::{Command, EpochNum, GroupTime, PeerId, SeqNum};
use serde::{Deserialize, Serialize};

/// An application request, sent to the leader for sequencing.
///
/// Only requests from Active members are converted into commands; anything
/// else is silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRequest {
    /// Opaque application payload.
    pub payload: Vec<u8>,
}

/// An application observation, forwarded to the leader after local conflict
/// resolution.
///
/// Observers batch observations over a window, sort them by timestamp and
/// drop conflicting ones before submission, so the leader sequences them
/// exactly like requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppObservation {
    /// Group time at which the observation was made.
    pub observed_at: GroupTime,

    /// Opaque application payload.
    pub payload: Vec<u8>,
}

/// A sequenced command from the leader.
///
/// Also unicast from the applied-command log while serving catch-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Leadership term under which the command was issued; commands double
    /// as leader liveness signals.
    pub term: u64,

    /// The command.
    pub command: Command,
}

/// Leader liveness signal, sent when no command has gone out within the
/// heartbeat period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Current leadership term.
    pub term: u64,

    /// Highest sequence number the leader has issued, letting an idle-group
    /// member detect a gap without waiting for the next command.
    pub last_seq: Option<SeqNum>,
}

/// Scheduled leadership assignment, broadcast by the current leader each time
/// it seals an epoch.
///
/// Every member applies it locally at the stated epoch boundary. The promoted
/// leader resumes sequence numbering at the last applied number plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLeader {
    /// The peer that will lead.
    pub new_leader: PeerId,

    /// Term number of the new leadership.
    pub term: u64,

    /// Epoch at whose start the assignment takes effect.
    pub effective_epoch: EpochNum,
}
