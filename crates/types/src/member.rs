//! Group member records.

use crate::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a group member.
///
/// Transitions are driven only by the sequencing authority (the leader), or
/// locally when a peer detects its own departure. The normal join path is
/// New → Joining → SyncingState → SyncingClock → Active; a member that is
/// not behind skips SyncingState.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Known but has not yet asked to join.
    New,
    /// Join requested, approval vote in progress.
    Joining,
    /// Approved, catching up on application state.
    SyncingState,
    /// State caught up, group clock not yet initialized.
    SyncingClock,
    /// Full participant.
    Active,
    /// Departed; record kept only long enough to propagate the fact.
    Removed,
}

impl MemberStatus {
    /// Whether this member counts toward quorum and may submit traffic.
    pub fn is_active(self) -> bool {
        matches!(self, MemberStatus::Active)
    }

    /// Whether this member is past join approval (receives commands).
    pub fn is_member(self) -> bool {
        matches!(
            self,
            MemberStatus::SyncingState | MemberStatus::SyncingClock | MemberStatus::Active
        )
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::New => "New",
            MemberStatus::Joining => "Joining",
            MemberStatus::SyncingState => "SyncingState",
            MemberStatus::SyncingClock => "SyncingClock",
            MemberStatus::Active => "Active",
            MemberStatus::Removed => "Removed",
        };
        f.write_str(s)
    }
}

/// A peer's membership record within one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The peer this record describes.
    pub peer: PeerId,

    /// Current lifecycle status.
    pub status: MemberStatus,

    /// Opaque application data supplied with the join request.
    pub app_data: String,

    /// Transport reported this peer as unreachable but not yet gone.
    pub missing: bool,
}

impl Member {
    /// Create a record for a peer that has just asked to join.
    pub fn joining(peer: PeerId, app_data: impl Into<String>) -> Self {
        Self {
            peer,
            status: MemberStatus::Joining,
            app_data: app_data.into(),
            missing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_predicates() {
        assert!(MemberStatus::Active.is_active());
        assert!(!MemberStatus::SyncingClock.is_active());
        assert!(MemberStatus::SyncingState.is_member());
        assert!(!MemberStatus::Joining.is_member());
        assert!(!MemberStatus::Removed.is_member());
    }

    #[test]
    fn joining_record() {
        let m = Member::joining(PeerId(7), "alice");
        assert_eq!(m.status, MemberStatus::Joining);
        assert_eq!(m.app_data, "alice");
        assert!(!m.missing);
    }
}
