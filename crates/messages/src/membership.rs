//! Membership messages: joining, status propagation, rejection.

use lockstep_types::{MemberStatus, PeerId};
use serde::{Deserialize, Serialize};

/// A peer asks to join the group.
///
/// Broadcast on the group channel so every Active member can register an
/// approval vote with the leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// The peer asking to join.
    pub peer: PeerId,

    /// Opaque application data (display name, avatar, ...).
    pub app_data: String,
}

impl JoinRequest {
    /// Create a join request.
    pub fn new(peer: PeerId, app_data: impl Into<String>) -> Self {
        Self {
            peer,
            app_data: app_data.into(),
        }
    }
}

/// An Active member's approval of a join candidate, sent to the leader.
///
/// The voter is identified by the transport sender, not the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinVote {
    /// The candidate being approved.
    pub candidate: PeerId,
}

/// The leader announces that a peer has joined.
///
/// Also unicast to a newcomer once per existing member, replaying the group's
/// join history before the newcomer's own join is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoined {
    /// The member.
    pub peer: PeerId,

    /// Application data from the original join request.
    pub app_data: String,
}

/// The leader announces a member's status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatusUpdate {
    /// The member whose status changed.
    pub peer: PeerId,

    /// The new status.
    pub status: MemberStatus,
}

/// The leader rejects a join request.
///
/// The only protocol failure propagated to the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinFailed {
    /// The rejected peer.
    pub peer: PeerId,

    /// Why the join failed.
    pub reason: String,
}
