//! Wire message payloads for the lockstep group-agreement protocol.
//!
//! Payload shapes only; the serialization format and transport are external
//! collaborators. All message kinds live in one sum type so that dispatch is
//! an exhaustive match with compile-time coverage, not a runtime table
//! lookup that silently no-ops on missing keys.

mod discovery;
mod membership;
mod ordering;
mod sync;

pub use discovery::{GroupAnnounce, GroupsRequest};
pub use membership::{JoinFailed, JoinRequest, JoinVote, MemberJoined, MemberStatusUpdate};
pub use ordering::{AppObservation, AppRequest, CommandMessage, Heartbeat, SetLeader};
pub use sync::{CheckpointReport, ClockOffset, SyncCompletion, SyncData, SyncRequest};

use lockstep_types::GroupId;
use serde::{Deserialize, Serialize};

/// Every message kind exchanged between peers of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMessage {
    /// Discovery: ask for announcements of hosted groups.
    GroupsRequest(GroupsRequest),
    /// Discovery: announce a hosted group.
    GroupAnnounce(GroupAnnounce),
    /// A peer asks to join the group.
    JoinRequest(JoinRequest),
    /// An Active member approves a join candidate.
    JoinVote(JoinVote),
    /// The leader announces an approved member.
    MemberJoined(MemberJoined),
    /// The leader announces a member status change.
    MemberStatus(MemberStatusUpdate),
    /// The leader rejects a join request.
    JoinFailed(JoinFailed),
    /// Pre-ordering application request, sent to the leader.
    Request(AppRequest),
    /// Pre-ordering application observation, filtered by the observer.
    Observation(AppObservation),
    /// A sequenced command from the leader.
    Command(CommandMessage),
    /// Leader liveness signal when no command has been sent recently.
    Heartbeat(Heartbeat),
    /// Scheduled leadership assignment.
    SetLeader(SetLeader),
    /// A lagging peer asks for catch-up data.
    SyncRequest(SyncRequest),
    /// Epoch snapshot sent to a lagging peer.
    SyncData(SyncData),
    /// A catching-up peer reports it has reached the current sequence.
    SyncCompletion(SyncCompletion),
    /// Advisory checkpoint digest report to the leader.
    CheckpointReport(CheckpointReport),
    /// Periodic group-time offset announcement.
    ClockOffset(ClockOffset),
}

impl GroupMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            GroupMessage::GroupsRequest(_) => "GroupsRequest",
            GroupMessage::GroupAnnounce(_) => "GroupAnnounce",
            GroupMessage::JoinRequest(_) => "JoinRequest",
            GroupMessage::JoinVote(_) => "JoinVote",
            GroupMessage::MemberJoined(_) => "MemberJoined",
            GroupMessage::MemberStatus(_) => "MemberStatus",
            GroupMessage::JoinFailed(_) => "JoinFailed",
            GroupMessage::Request(_) => "Request",
            GroupMessage::Observation(_) => "Observation",
            GroupMessage::Command(_) => "Command",
            GroupMessage::Heartbeat(_) => "Heartbeat",
            GroupMessage::SetLeader(_) => "SetLeader",
            GroupMessage::SyncRequest(_) => "SyncRequest",
            GroupMessage::SyncData(_) => "SyncData",
            GroupMessage::SyncCompletion(_) => "SyncCompletion",
            GroupMessage::CheckpointReport(_) => "CheckpointReport",
            GroupMessage::ClockOffset(_) => "ClockOffset",
        }
    }
}

/// A message addressed to a logical group.
///
/// `group: None` means "all locally hosted groups"; discovery traffic uses
/// this before the sender knows any group id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination group, or every locally hosted group when absent.
    pub group: Option<GroupId>,

    /// The payload.
    pub message: GroupMessage,
}

impl Envelope {
    /// Address a message to one group.
    pub fn to_group(group: GroupId, message: GroupMessage) -> Self {
        Self {
            group: Some(group),
            message,
        }
    }

    /// Address a message to all locally hosted groups.
    pub fn to_all(message: GroupMessage) -> Self {
        Self {
            group: None,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::PeerId;

    #[test]
    fn type_names() {
        let msg = GroupMessage::GroupsRequest(GroupsRequest);
        assert_eq!(msg.type_name(), "GroupsRequest");

        let msg = GroupMessage::JoinVote(JoinVote {
            candidate: PeerId(3),
        });
        assert_eq!(msg.type_name(), "JoinVote");
    }

    #[test]
    fn envelope_addressing() {
        let all = Envelope::to_all(GroupMessage::GroupsRequest(GroupsRequest));
        assert!(all.group.is_none());

        let one = Envelope::to_group(
            GroupId::new("g"),
            GroupMessage::GroupsRequest(GroupsRequest),
        );
        assert_eq!(one.group, Some(GroupId::new("g")));
    }
}
