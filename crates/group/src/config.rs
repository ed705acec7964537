//! Group protocol configuration.

use lockstep_clock::ClockConfig;
use lockstep_sync::SyncConfig;
use std::time::Duration;

/// Configuration for one group-agreement protocol instance.
///
/// Injected through the constructor; there are no ambient config
/// dictionaries.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// How often the leader seals an epoch with a sequenced checkpoint.
    pub checkpoint_period: Duration,

    /// Random extra delay added to each checkpoint period, avoiding
    /// synchronized checkpoint storms across groups.
    pub checkpoint_jitter: Duration,

    /// Scheduled handover horizon: a nominated leader takes over this many
    /// epochs after the nomination.
    pub leader_term_epochs: u64,

    /// Leader sends a heartbeat when no command has gone out for this long.
    pub heartbeat: Duration,

    /// Lower bound of the randomized follower election timeout.
    pub election_timeout_min: Duration,

    /// Upper bound of the randomized follower election timeout.
    pub election_timeout_max: Duration,

    /// How long a join-approval vote may run before it is lost.
    pub vote_timeout: Duration,

    /// How long a finished vote record is kept before being purged.
    pub vote_cleanup_window: Duration,

    /// Batching window for locally collected observations.
    pub observation_window: Duration,

    /// Collection window for a groups-discovery query.
    pub groups_query_window: Duration,

    /// How many sealed epochs (and the commands they cover) are retained.
    pub retained_epochs: usize,

    /// RNG seed for election jitter, checkpoint jitter and leader
    /// nomination; fixed per instance for deterministic replay.
    pub seed: u64,

    /// Command stash/catch-up configuration.
    pub sync: SyncConfig,

    /// Clock synchronizer configuration.
    pub clock: ClockConfig,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            checkpoint_period: Duration::from_secs(10),
            checkpoint_jitter: Duration::from_secs(2),
            leader_term_epochs: 2,
            heartbeat: Duration::from_millis(500),
            election_timeout_min: Duration::from_millis(1_500),
            election_timeout_max: Duration::from_millis(3_000),
            vote_timeout: Duration::from_secs(1),
            vote_cleanup_window: Duration::from_secs(5),
            observation_window: Duration::from_millis(100),
            groups_query_window: Duration::from_secs(1),
            retained_epochs: 3,
            seed: 0,
            sync: SyncConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl GroupConfig {
    /// Set the checkpoint period.
    pub fn with_checkpoint_period(mut self, period: Duration) -> Self {
        self.checkpoint_period = period;
        self
    }

    /// Set the checkpoint jitter.
    pub fn with_checkpoint_jitter(mut self, jitter: Duration) -> Self {
        self.checkpoint_jitter = jitter;
        self
    }

    /// Set the heartbeat period.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the randomized election timeout range.
    pub fn with_election_timeout(mut self, min: Duration, max: Duration) -> Self {
        self.election_timeout_min = min;
        self.election_timeout_max = max;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the sync configuration.
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Set the clock configuration.
    pub fn with_clock(mut self, clock: ClockConfig) -> Self {
        self.clock = clock;
        self
    }
}
