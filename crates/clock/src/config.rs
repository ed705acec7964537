//! Clock synchronizer configuration.

use std::time::Duration;

/// How a peer slews its group clock toward the rest of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Every peer slews toward the mean of all peers' implied group times.
    Cooperative,

    /// Non-leader peers slew exclusively toward the leader's reported
    /// offset; the leader's own clock is authoritative by definition.
    LeaderAuthoritative,
}

/// Configuration for the clock synchronizer.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Slewing policy, selected at construction.
    pub policy: SyncPolicy,

    /// How often each peer broadcasts its own (group time − system time)
    /// offset. Also the horizon over which corrections are damped.
    pub announce_period: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            policy: SyncPolicy::Cooperative,
            announce_period: Duration::from_secs(1),
        }
    }
}

impl ClockConfig {
    /// Set the slewing policy.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the announce period.
    pub fn with_announce_period(mut self, period: Duration) -> Self {
        self.announce_period = period;
        self
    }
}
