//! Ordered command application with stash and replay.

use crate::SyncConfig;
use lockstep_types::{Command, PeerId, SeqNum};
use std::collections::BTreeMap;
use tracing::debug;

/// Classification of an inbound command. Every command passes through this
/// exactly-once gate before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDisposition {
    /// The local peer is not yet a member; drop.
    LocalPeerNotReady,

    /// The sender is not the current leader; log and drop.
    BadSource,

    /// Stale or duplicate sequence number; drop silently.
    AlreadyReceived,

    /// Early-arriving valid command; buffer it. `resync_needed` is set when
    /// the gap exceeds the tolerated reorder window.
    StashedInQueue { resync_needed: bool },

    /// Exactly the next expected command; apply it.
    ShouldApply,
}

/// Result of one bounded apply pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Commands applied this pass.
    pub applied: usize,

    /// The application has consumed everything stashed; signals "caught up"
    /// to the caller.
    pub caught_up: bool,
}

/// Stashes out-of-order commands and replays them in strict sequence order.
///
/// `max_applied` never exceeds the highest *contiguous* sequence received;
/// the applied-command log doubles as the source for serving catch-up
/// traffic to lagging peers.
#[derive(Debug)]
pub struct CommandSynchronizer {
    config: SyncConfig,
    stash: BTreeMap<u64, Command>,
    applied_log: BTreeMap<u64, Command>,
    max_applied: Option<SeqNum>,
    max_stashed: Option<SeqNum>,
}

impl CommandSynchronizer {
    /// Create an empty synchronizer.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            stash: BTreeMap::new(),
            applied_log: BTreeMap::new(),
            max_applied: None,
            max_stashed: None,
        }
    }

    /// Highest contiguously applied sequence number.
    pub fn max_applied(&self) -> Option<SeqNum> {
        self.max_applied
    }

    /// Highest sequence number seen (applied or stashed).
    pub fn max_stashed(&self) -> Option<SeqNum> {
        self.max_stashed
    }

    /// The next sequence number the local peer needs.
    pub fn expected_seq(&self) -> SeqNum {
        self.max_applied.map(SeqNum::next).unwrap_or(SeqNum::FIRST)
    }

    /// Lowest sequence number currently stashed.
    pub fn first_stashed_seq(&self) -> Option<SeqNum> {
        self.stash.keys().next().map(|&s| SeqNum(s))
    }

    /// Classify an inbound command. No side effects.
    pub fn evaluate(
        &self,
        seq: SeqNum,
        from: PeerId,
        leader: Option<PeerId>,
        local_ready: bool,
    ) -> CommandDisposition {
        if !local_ready {
            return CommandDisposition::LocalPeerNotReady;
        }
        if leader != Some(from) {
            return CommandDisposition::BadSource;
        }

        let expected = self.expected_seq();
        if seq < expected {
            return CommandDisposition::AlreadyReceived;
        }
        if seq == expected {
            return CommandDisposition::ShouldApply;
        }
        CommandDisposition::StashedInQueue {
            resync_needed: seq.0 - expected.0 > self.config.allowed_skipped_commands,
        }
    }

    /// Buffer a command for in-order replay. Duplicate stashes are harmless.
    pub fn stash(&mut self, command: Command) {
        let seq = command.seq;
        self.stash.insert(seq.0, command);
        if self.max_stashed.map_or(true, |m| seq > m) {
            self.max_stashed = Some(seq);
        }
    }

    /// Apply stashed commands in order, at most the configured cap per call.
    ///
    /// Stops when the cap is reached, the stash has no next command, or the
    /// application has caught up to everything stashed. `apply` receives
    /// each command exactly once, in strict sequence order.
    pub fn apply_stashed(&mut self, mut apply: impl FnMut(&Command)) -> ApplyOutcome {
        let mut applied = 0;
        while applied < self.config.stashed_applied_per_tick {
            let expected = self.expected_seq();
            let Some(command) = self.stash.remove(&expected.0) else {
                break;
            };
            apply(&command);
            self.max_applied = Some(expected);
            self.applied_log.insert(expected.0, command);
            applied += 1;
        }

        let caught_up = match self.max_stashed {
            None => true,
            Some(max) => self.max_applied == Some(max) || self.max_applied > Some(max),
        };
        ApplyOutcome { applied, caught_up }
    }

    /// Jump the applied position to a restored snapshot's sequence number.
    ///
    /// Stashed commands the snapshot covers are dropped; the applied log is
    /// cleared since this peer can no longer serve history before the
    /// snapshot.
    pub fn reset_to_snapshot(&mut self, seq: SeqNum) {
        debug!(%seq, "resetting to snapshot");
        self.max_applied = Some(seq);
        self.stash.retain(|&s, _| s > seq.0);
        self.applied_log.clear();
        if self.max_stashed.map_or(true, |m| m < seq) {
            self.max_stashed = Some(seq);
        }
    }

    /// Get an applied command by sequence number, if still retained.
    pub fn applied_command(&self, seq: SeqNum) -> Option<&Command> {
        self.applied_log.get(&seq.0)
    }

    /// Drop applied-log entries below `seq` (epoch-window pruning).
    pub fn prune_applied_below(&mut self, seq: SeqNum) {
        self.applied_log.retain(|&s, _| s >= seq.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::EpochNum;

    fn cmd(seq: u64) -> Command {
        Command::app(EpochNum(0), SeqNum(seq), vec![seq as u8])
    }

    fn sync() -> CommandSynchronizer {
        CommandSynchronizer::new(SyncConfig::default())
    }

    #[test]
    fn applies_only_the_contiguous_prefix() {
        let mut s = sync();
        // Sequence 3 is missing.
        for seq in [4u64, 0, 2, 5, 1] {
            s.stash(cmd(seq));
        }

        let mut seen = Vec::new();
        let outcome = s.apply_stashed(|c| seen.push(c.seq.0));
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(s.max_applied(), Some(SeqNum(2)));
        assert!(!outcome.caught_up);

        // Sequence 3 arrives; the rest drains.
        s.stash(cmd(3));
        let outcome = s.apply_stashed(|c| seen.push(c.seq.0));
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert!(outcome.caught_up);
        assert_eq!(s.max_applied(), Some(SeqNum(5)));
    }

    #[test]
    fn per_tick_cap_bounds_work() {
        let mut s = CommandSynchronizer::new(SyncConfig::default().with_stashed_applied_per_tick(2));
        for seq in 0..5u64 {
            s.stash(cmd(seq));
        }

        let outcome = s.apply_stashed(|_| {});
        assert_eq!(outcome.applied, 2);
        assert!(!outcome.caught_up);

        let outcome = s.apply_stashed(|_| {});
        assert_eq!(outcome.applied, 2);
        let outcome = s.apply_stashed(|_| {});
        assert_eq!(outcome.applied, 1);
        assert!(outcome.caught_up);
    }

    #[test]
    fn classification() {
        let leader = PeerId(1);
        let other = PeerId(2);
        let mut s = sync();
        s.stash(cmd(0));
        s.apply_stashed(|_| {});

        // Not a member yet.
        assert_eq!(
            s.evaluate(SeqNum(1), leader, Some(leader), false),
            CommandDisposition::LocalPeerNotReady
        );
        // Sender is not the leader.
        assert_eq!(
            s.evaluate(SeqNum(1), other, Some(leader), true),
            CommandDisposition::BadSource
        );
        // Duplicate.
        assert_eq!(
            s.evaluate(SeqNum(0), leader, Some(leader), true),
            CommandDisposition::AlreadyReceived
        );
        // Next expected.
        assert_eq!(
            s.evaluate(SeqNum(1), leader, Some(leader), true),
            CommandDisposition::ShouldApply
        );
        // Small gap: absorbed.
        assert_eq!(
            s.evaluate(SeqNum(3), leader, Some(leader), true),
            CommandDisposition::StashedInQueue {
                resync_needed: false
            }
        );
        // Large gap: resync.
        assert_eq!(
            s.evaluate(SeqNum(9), leader, Some(leader), true),
            CommandDisposition::StashedInQueue { resync_needed: true }
        );
    }

    #[test]
    fn duplicate_application_is_impossible() {
        let mut s = sync();
        s.stash(cmd(0));
        s.stash(cmd(0));
        let mut count = 0;
        s.apply_stashed(|_| count += 1);
        s.stash(cmd(0));
        s.apply_stashed(|_| count += 1);
        assert_eq!(count, 1);
        assert_eq!(s.max_applied(), Some(SeqNum(0)));
    }

    #[test]
    fn snapshot_reset_skips_covered_commands() {
        let mut s = sync();
        for seq in [8u64, 9, 12] {
            s.stash(cmd(seq));
        }
        s.reset_to_snapshot(SeqNum(9));

        assert_eq!(s.expected_seq(), SeqNum(10));
        assert_eq!(s.first_stashed_seq(), Some(SeqNum(12)));

        let mut seen = Vec::new();
        s.apply_stashed(|c| seen.push(c.seq.0));
        assert!(seen.is_empty());

        for seq in [10u64, 11] {
            s.stash(cmd(seq));
        }
        s.apply_stashed(|c| seen.push(c.seq.0));
        assert_eq!(seen, vec![10, 11, 12]);
    }

    #[test]
    fn applied_log_serves_and_prunes() {
        let mut s = sync();
        for seq in 0..4u64 {
            s.stash(cmd(seq));
        }
        s.apply_stashed(|_| {});
        assert!(s.applied_command(SeqNum(0)).is_some());

        s.prune_applied_below(SeqNum(2));
        assert!(s.applied_command(SeqNum(1)).is_none());
        assert!(s.applied_command(SeqNum(2)).is_some());
        assert!(s.applied_command(SeqNum(3)).is_some());
    }
}
