//! Group discovery messages.

use lockstep_types::GroupInfo;
use serde::{Deserialize, Serialize};

/// Ask every reachable peer to announce the groups it hosts.
///
/// Sent with an empty envelope group id so it reaches all hosted groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsRequest;

/// Announcement of a hosted group, unicast back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAnnounce {
    /// Descriptor of the announced group.
    pub info: GroupInfo,
}
