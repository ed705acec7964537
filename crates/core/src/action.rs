//! Outbound actions returned by protocol state machines.

use crate::RequestId;
use lockstep_messages::{Envelope, GroupMessage};
use lockstep_types::{GroupId, GroupInfo, MemberStatus, PeerId, SeqNum};

/// Side effects for the runner to execute.
///
/// Broadcasts are delivered to every connected peer *including the
/// originator*; the leader consumes its own commands through the same
/// inbound path as everyone else.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send to every connected peer (originator included).
    Broadcast { envelope: Envelope },

    /// Send to one peer.
    Unicast { to: PeerId, envelope: Envelope },

    /// Surface something to the local application layer.
    Notify(Notification),
}

impl Action {
    /// Broadcast a message to one group's channel.
    pub fn broadcast(group: GroupId, message: GroupMessage) -> Self {
        Action::Broadcast {
            envelope: Envelope::to_group(group, message),
        }
    }

    /// Broadcast a message to all locally hosted groups.
    pub fn broadcast_all(message: GroupMessage) -> Self {
        Action::Broadcast {
            envelope: Envelope::to_all(message),
        }
    }

    /// Unicast a message to one peer on a group's channel.
    pub fn unicast(to: PeerId, group: GroupId, message: GroupMessage) -> Self {
        Action::Unicast {
            to,
            envelope: Envelope::to_group(group, message),
        }
    }
}

/// Protocol happenings surfaced to the local application layer.
#[derive(Debug, Clone)]
pub enum Notification {
    /// The local peer's join request was rejected. The only protocol failure
    /// actively propagated to the application.
    JoinFailed { peer: PeerId, reason: String },

    /// A member's status changed (the local peer included).
    MemberStatusChanged { peer: PeerId, status: MemberStatus },

    /// Leadership changed hands.
    LeaderChanged { leader: PeerId, term: u64 },

    /// The local peer has applied every command it knows about.
    CaughtUp { seq: Option<SeqNum> },

    /// Result of a groups query after its collection window closed.
    GroupsDiscovered {
        request_id: RequestId,
        groups: Vec<GroupInfo>,
    },
}
