//! Group descriptors for discovery.

use crate::{GroupId, PeerId};
use serde::{Deserialize, Serialize};

/// Descriptor of a hosted group, announced in response to discovery requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group identifier.
    pub id: GroupId,

    /// Human-readable name.
    pub name: String,

    /// Peer that created the group.
    pub creator: PeerId,
}

impl GroupInfo {
    /// Create a group descriptor.
    pub fn new(id: GroupId, name: impl Into<String>, creator: PeerId) -> Self {
        Self {
            id,
            name: name.into(),
            creator,
        }
    }
}
