//! Distributed group-time synchronizer.
//!
//! Each peer maintains a virtual group clock as a function of its local
//! system clock:
//!
//! ```text
//! group_time = (system_time - base_system_time) * rate + base_group_time
//! ```
//!
//! Peers periodically broadcast their own (group time − system time) offset.
//! Combining a peer's announced offset with the transport's estimate of that
//! peer's system-clock offset yields the group time the peer would report
//! right now; the synchronizer slews its rate toward the mean of those
//! implied values, correcting roughly half the observed drift per announce
//! period. Corrections are damped, never instantaneous.

mod config;

pub use config::{ClockConfig, SyncPolicy};

use lockstep_types::{GroupTime, PeerId};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Stored clock samples for one remote peer.
///
/// Purged immediately when the peer leaves, under both policies.
#[derive(Debug, Clone, Copy, Default)]
struct PeerClock {
    /// Offset of the peer's system clock from ours (transport-supplied).
    system_offset_ms: Option<i64>,
    /// The peer's announced (group time − system time) offset.
    group_offset_ms: Option<i64>,
}

impl PeerClock {
    /// Group time the peer would report now, if both samples are present.
    fn implied_group_time(&self, local_system_ms: i64) -> Option<i64> {
        Some(local_system_ms + self.system_offset_ms? + self.group_offset_ms?)
    }
}

/// Outcome of feeding a peer's offset announcement to the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockUpdate {
    /// Not yet initialized; waiting for reports from at least half of the
    /// currently Active members.
    Waiting { reports: usize, needed: usize },

    /// The local group clock just initialized from the mean of the implied
    /// peer values.
    Initialized,

    /// The rate was adjusted toward the group.
    Slewed { mean_error_ms: f64, rate: f64 },

    /// Nothing to do (leader under the leader-authoritative policy, or the
    /// announcing peer's system offset is still unknown).
    Unchanged,
}

/// Maintains this peer's virtual group clock.
#[derive(Debug)]
pub struct ClockSynchronizer {
    config: ClockConfig,
    peers: HashMap<PeerId, PeerClock>,

    base_system_ms: i64,
    base_group: GroupTime,
    rate: f64,
    initialized: bool,

    last_announce: Option<Duration>,
    now: Duration,
}

impl ClockSynchronizer {
    /// Create an uninitialized synchronizer; the group clock starts once
    /// enough peers have reported.
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            peers: HashMap::new(),
            base_system_ms: 0,
            base_group: GroupTime::ZERO,
            rate: 1.0,
            initialized: false,
            last_announce: None,
            now: Duration::ZERO,
        }
    }

    /// Set the current local system time. Call before any other method on
    /// each tick.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    /// Start the group timeline here and now.
    ///
    /// Used by a group creator: with no one else to agree with, its clock is
    /// the group clock.
    pub fn initialize_at(&mut self, group_time: GroupTime) {
        self.base_system_ms = self.system_ms();
        self.base_group = group_time;
        self.rate = 1.0;
        self.initialized = true;
    }

    /// Whether the group clock has initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current clock rate relative to the system clock.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Current group time, if initialized.
    pub fn group_time(&self) -> Option<GroupTime> {
        if !self.initialized {
            return None;
        }
        let elapsed = (self.system_ms() - self.base_system_ms) as f64;
        Some(self.base_group.offset_by((elapsed * self.rate) as i64))
    }

    /// The local (group time − system time) offset to announce, if
    /// initialized.
    pub fn local_offset_ms(&self) -> Option<i64> {
        Some(self.group_time()?.as_millis() - self.system_ms())
    }

    /// Whether an offset announcement is due. Peers only announce once
    /// initialized; the first announcement doubles as the clock-sync
    /// completion signal during join.
    pub fn announce_due(&self) -> bool {
        if !self.initialized {
            return false;
        }
        match self.last_announce {
            None => true,
            Some(at) => self.now >= at + self.config.announce_period,
        }
    }

    /// Record that an announcement went out.
    pub fn mark_announced(&mut self) {
        self.last_announce = Some(self.now);
    }

    /// Feed a transport-supplied system-clock offset sample for a peer.
    pub fn on_system_offset(&mut self, peer: PeerId, offset_ms: i64, _lag_ms: i64) {
        self.peers.entry(peer).or_default().system_offset_ms = Some(offset_ms);
    }

    /// Discard all stored samples for a departed peer.
    pub fn on_peer_departed(&mut self, peer: PeerId) {
        self.peers.remove(&peer);
    }

    /// Feed a peer's announced group-time offset.
    ///
    /// `reports_needed` is half the currently Active membership, rounded up;
    /// until that many peers have fully reported, the local clock stays
    /// unset. `leader` selects the reference peer under the
    /// leader-authoritative policy; pass `None` when the local peer is the
    /// leader (its clock is never adjusted by others).
    pub fn on_group_offset(
        &mut self,
        peer: PeerId,
        group_offset_ms: i64,
        reports_needed: usize,
        leader: Option<PeerId>,
    ) -> ClockUpdate {
        self.peers.entry(peer).or_default().group_offset_ms = Some(group_offset_ms);

        if !self.initialized {
            return self.try_initialize(reports_needed);
        }

        let local = match self.group_time() {
            Some(t) => t.as_millis(),
            None => return ClockUpdate::Unchanged,
        };
        let system_ms = self.system_ms();

        let errors: Vec<f64> = match self.config.policy {
            SyncPolicy::Cooperative => self
                .peers
                .values()
                .filter_map(|p| p.implied_group_time(system_ms))
                .map(|implied| (implied - local) as f64)
                .collect(),
            SyncPolicy::LeaderAuthoritative => {
                let Some(leader) = leader else {
                    return ClockUpdate::Unchanged;
                };
                if peer != leader {
                    return ClockUpdate::Unchanged;
                }
                match self
                    .peers
                    .get(&leader)
                    .and_then(|p| p.implied_group_time(system_ms))
                {
                    Some(implied) => vec![(implied - local) as f64],
                    None => return ClockUpdate::Unchanged,
                }
            }
        };

        if errors.is_empty() {
            return ClockUpdate::Unchanged;
        }

        let mean_error_ms = errors.iter().sum::<f64>() / errors.len() as f64;
        self.slew(local, mean_error_ms);
        debug!(mean_error_ms, rate = self.rate, "clock slewed");
        ClockUpdate::Slewed {
            mean_error_ms,
            rate: self.rate,
        }
    }

    fn try_initialize(&mut self, reports_needed: usize) -> ClockUpdate {
        let system_ms = self.system_ms();
        let implied: Vec<i64> = self
            .peers
            .values()
            .filter_map(|p| p.implied_group_time(system_ms))
            .collect();

        if implied.len() < reports_needed.max(1) {
            return ClockUpdate::Waiting {
                reports: implied.len(),
                needed: reports_needed.max(1),
            };
        }

        let mean = implied.iter().sum::<i64>() / implied.len() as i64;
        self.base_system_ms = system_ms;
        self.base_group = GroupTime(mean);
        self.rate = 1.0;
        self.initialized = true;
        debug!(group_time = mean, reports = implied.len(), "clock initialized");
        ClockUpdate::Initialized
    }

    /// Rebase at the current group time and set a rate that corrects half
    /// the observed drift over one announce period.
    fn slew(&mut self, current_group_ms: i64, mean_error_ms: f64) {
        let period_ms = self.config.announce_period.as_millis() as f64;
        self.base_system_ms = self.system_ms();
        self.base_group = GroupTime(current_group_ms);
        self.rate = 1.0 + 0.5 * mean_error_ms / period_ms;
    }

    fn system_ms(&self) -> i64 {
        self.now.as_millis() as i64
    }
}
