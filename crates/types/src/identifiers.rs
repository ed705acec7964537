//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer identifier, assigned by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

/// Logical group identifier.
///
/// Carried by every message envelope; an envelope without a group id is
/// addressed to all locally hosted groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Create a group id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

/// Command sequence number.
///
/// Assigned only by the current leader, monotonic and gapless once applied.
/// Never resets, including across leader handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeqNum(pub u64);

impl SeqNum {
    /// The first sequence number issued in a group's lifetime.
    pub const FIRST: Self = SeqNum(0);

    /// Get the next sequence number.
    pub fn next(self) -> Self {
        SeqNum(self.0 + 1)
    }

    /// Get the previous sequence number (returns None at the start).
    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(SeqNum(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// Epoch number, counting sealed checkpoints since group creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpochNum(pub u64);

impl EpochNum {
    /// The epoch open at group creation.
    pub const GENESIS: Self = EpochNum(0);

    /// Get the next epoch number.
    pub fn next(self) -> Self {
        EpochNum(self.0 + 1)
    }
}

impl fmt::Display for EpochNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

/// A point on the shared group timeline, in milliseconds.
///
/// Each peer derives group time from its own system clock through the clock
/// synchronizer; the value is comparable across peers once clocks converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupTime(pub i64);

impl GroupTime {
    /// Time zero of the group timeline.
    pub const ZERO: Self = GroupTime(0);

    /// Milliseconds since time zero.
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Offset this time by a signed number of milliseconds.
    pub fn offset_by(self, millis: i64) -> Self {
        GroupTime(self.0 + millis)
    }
}

impl fmt::Display for GroupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_num_ordering() {
        assert_eq!(SeqNum::FIRST.next(), SeqNum(1));
        assert_eq!(SeqNum(5).prev(), Some(SeqNum(4)));
        assert_eq!(SeqNum::FIRST.prev(), None);
        assert!(SeqNum(3) < SeqNum(4));
    }

    #[test]
    fn group_time_arithmetic() {
        assert_eq!(GroupTime(1_000).offset_by(-250), GroupTime(750));
    }
}
