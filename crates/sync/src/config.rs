//! Sync configuration.

use std::time::Duration;

/// Configuration for command synchronization and catch-up.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum stashed commands applied per tick (bounds per-tick work on
    /// the applying side).
    pub stashed_applied_per_tick: usize,

    /// Maximum catch-up commands a responder sends per tick (the system's
    /// backpressure mechanism for catch-up traffic).
    pub max_sync_commands_per_tick: usize,

    /// Sequence gaps up to this size are assumed transient reordering and
    /// absorbed without a resync request.
    pub allowed_skipped_commands: u64,

    /// Retry interval while awaiting sync confirmation.
    pub completion_wait: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stashed_applied_per_tick: 30,
            max_sync_commands_per_tick: 10,
            allowed_skipped_commands: 2,
            completion_wait: Duration::from_secs(2),
        }
    }
}

impl SyncConfig {
    /// Set the per-tick apply cap.
    pub fn with_stashed_applied_per_tick(mut self, cap: usize) -> Self {
        self.stashed_applied_per_tick = cap;
        self
    }

    /// Set the per-tick catch-up send cap.
    pub fn with_max_sync_commands_per_tick(mut self, cap: usize) -> Self {
        self.max_sync_commands_per_tick = cap;
        self
    }

    /// Set the tolerated reorder gap.
    pub fn with_allowed_skipped_commands(mut self, gap: u64) -> Self {
        self.allowed_skipped_commands = gap;
        self
    }

    /// Set the sync completion retry interval.
    pub fn with_completion_wait(mut self, wait: Duration) -> Self {
        self.completion_wait = wait;
        self
    }
}
