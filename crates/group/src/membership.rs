//! The member table.
//!
//! Insertion order is join order, which the leader relies on when replaying
//! join history to a newcomer and when picking a deterministic fallback
//! leader.

use indexmap::IndexMap;
use lockstep_types::{Member, MemberStatus, PeerId};
use std::collections::BTreeMap;
use tracing::debug;

/// All members of one group, keyed by peer and ordered by join.
#[derive(Debug, Default)]
pub struct MemberTable {
    members: IndexMap<PeerId, Member>,
}

impl MemberTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer that has asked to join. Existing records are left
    /// untouched (duplicate join messages are harmless).
    pub fn insert_joining(&mut self, peer: PeerId, app_data: &str) -> &Member {
        self.members
            .entry(peer)
            .or_insert_with(|| Member::joining(peer, app_data))
    }

    /// Look up a member.
    pub fn get(&self, peer: PeerId) -> Option<&Member> {
        self.members.get(&peer)
    }

    /// Whether the peer has a record.
    pub fn contains(&self, peer: PeerId) -> bool {
        self.members.contains_key(&peer)
    }

    /// A member's current status.
    pub fn status_of(&self, peer: PeerId) -> Option<MemberStatus> {
        self.members.get(&peer).map(|m| m.status)
    }

    /// Set a member's status, returning the previous status if the member
    /// exists and the status actually changed.
    pub fn set_status(&mut self, peer: PeerId, status: MemberStatus) -> Option<MemberStatus> {
        let member = self.members.get_mut(&peer)?;
        if member.status == status {
            return None;
        }
        let old = member.status;
        member.status = status;
        debug!(%peer, %old, new = %status, "member status changed");
        Some(old)
    }

    /// Flag or unflag a member the transport reports as unreachable.
    pub fn set_missing(&mut self, peer: PeerId, missing: bool) {
        if let Some(member) = self.members.get_mut(&peer) {
            member.missing = missing;
        }
    }

    /// Move a member to the back of the join order.
    ///
    /// Local tables pick up provisional records from observed join requests;
    /// the leader's member-joined announcements define the canonical order,
    /// and every peer realigns to it here.
    pub fn move_to_back(&mut self, peer: PeerId) {
        if let Some(member) = self.members.shift_remove(&peer) {
            self.members.insert(peer, member);
        }
    }

    /// Drop a member's record entirely.
    pub fn remove(&mut self, peer: PeerId) -> Option<Member> {
        self.members.shift_remove(&peer)
    }

    /// Number of members with Active status.
    pub fn active_count(&self) -> usize {
        self.members.values().filter(|m| m.status.is_active()).count()
    }

    /// Active members in join order.
    pub fn active_peers(&self) -> Vec<PeerId> {
        self.members
            .values()
            .filter(|m| m.status.is_active())
            .map(|m| m.peer)
            .collect()
    }

    /// Active members the transport currently reports reachable, in join
    /// order.
    pub fn reachable_active_peers(&self) -> Vec<PeerId> {
        self.members
            .values()
            .filter(|m| m.status.is_active() && !m.missing)
            .map(|m| m.peer)
            .collect()
    }

    /// The first Active member in join order, if any.
    pub fn oldest_active(&self) -> Option<PeerId> {
        self.members
            .values()
            .find(|m| m.status.is_active())
            .map(|m| m.peer)
    }

    /// Members past join approval, in join order, for replaying to a
    /// newcomer.
    pub fn replay_members(&self, exclude: PeerId) -> Vec<&Member> {
        self.members
            .values()
            .filter(|m| m.peer != exclude && m.status != MemberStatus::Joining)
            .collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Snapshot of every member's status, for comparisons across peers.
    pub fn statuses(&self) -> BTreeMap<PeerId, MemberStatus> {
        self.members.values().map(|m| (m.peer, m.status)).collect()
    }
}
