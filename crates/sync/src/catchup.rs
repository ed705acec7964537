//! Catch-up sessions served by the sequencing authority.
//!
//! A lagging peer announces the next sequence number it needs; the responder
//! streams commands from the applied log, at most a configured number per
//! tick so a deep catch-up cannot starve normal traffic.

use crate::CommandSynchronizer;
use lockstep_types::{Command, PeerId, SeqNum};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Session {
    next_seq: SeqNum,
    /// Stop before this sequence: the requester already has it stashed.
    stop_before: Option<SeqNum>,
}

/// Streams applied commands to lagging peers with bounded per-tick work.
#[derive(Debug, Default)]
pub struct CatchUpResponder {
    sessions: BTreeMap<PeerId, Session>,
}

impl CatchUpResponder {
    /// Create a responder with no open sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or restart) a session for a peer, starting at `from_seq` and
    /// stopping before `stop_before` when the requester reported the head of
    /// its stash.
    ///
    /// A repeated sync request from the same peer replaces its session; the
    /// requester retries with its current expected sequence, so restarting
    /// never loses data.
    pub fn begin(&mut self, peer: PeerId, from_seq: SeqNum, stop_before: Option<SeqNum>) {
        debug!(%peer, %from_seq, "opening catch-up session");
        self.sessions.insert(
            peer,
            Session {
                next_seq: from_seq,
                stop_before,
            },
        );
    }

    /// Drop a departed peer's session.
    pub fn drop_session(&mut self, peer: PeerId) {
        self.sessions.remove(&peer);
    }

    /// Whether any session is open.
    pub fn is_idle(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Produce the next batch of catch-up commands, at most `budget` in
    /// total across all sessions. Sessions that reach the head of the
    /// applied log are closed; the peer confirms with a sync completion
    /// message on its own.
    pub fn next_batch(
        &mut self,
        sync: &CommandSynchronizer,
        budget: usize,
    ) -> Vec<(PeerId, Command)> {
        let mut out = Vec::new();
        let mut done = Vec::new();

        for (&peer, session) in self.sessions.iter_mut() {
            while out.len() < budget {
                if sync.max_applied().map_or(true, |m| session.next_seq > m)
                    || session.stop_before.is_some_and(|s| session.next_seq >= s)
                {
                    done.push(peer);
                    break;
                }
                match sync.applied_command(session.next_seq) {
                    Some(command) => {
                        out.push((peer, command.clone()));
                        session.next_seq = session.next_seq.next();
                    }
                    None => {
                        // Pruned past the session start; the peer's next
                        // retry will pick up a snapshot instead.
                        warn!(%peer, seq = %session.next_seq, "catch-up session behind retained log");
                        done.push(peer);
                        break;
                    }
                }
            }
            if out.len() >= budget {
                break;
            }
        }

        for peer in done {
            self.sessions.remove(&peer);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncConfig;
    use lockstep_types::EpochNum;

    fn loaded_sync(upto: u64) -> CommandSynchronizer {
        let mut s = CommandSynchronizer::new(SyncConfig::default());
        for seq in 0..=upto {
            s.stash(Command::app(EpochNum(0), SeqNum(seq), vec![]));
        }
        s.apply_stashed(|_| {});
        s
    }

    #[test]
    fn streams_in_bounded_batches() {
        let sync = loaded_sync(24);
        let mut responder = CatchUpResponder::new();
        responder.begin(PeerId(7), SeqNum(0), None);

        let batch = responder.next_batch(&sync, 10);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0].1.seq, SeqNum(0));
        assert_eq!(batch[9].1.seq, SeqNum(9));

        let batch = responder.next_batch(&sync, 10);
        assert_eq!(batch[0].1.seq, SeqNum(10));

        let batch = responder.next_batch(&sync, 10);
        assert_eq!(batch.len(), 5);
        assert!(responder.is_idle());
    }

    #[test]
    fn budget_is_shared_across_sessions() {
        let sync = loaded_sync(9);
        let mut responder = CatchUpResponder::new();
        responder.begin(PeerId(1), SeqNum(0), None);
        responder.begin(PeerId(2), SeqNum(0), None);

        let batch = responder.next_batch(&sync, 6);
        assert_eq!(batch.len(), 6);
    }

    #[test]
    fn pruned_session_closes() {
        let mut sync = loaded_sync(9);
        sync.prune_applied_below(SeqNum(5));

        let mut responder = CatchUpResponder::new();
        responder.begin(PeerId(1), SeqNum(0), None);
        let batch = responder.next_batch(&sync, 10);
        assert!(batch.is_empty());
        assert!(responder.is_idle());
    }

    #[test]
    fn session_stops_before_stashed_head() {
        let sync = loaded_sync(9);
        let mut responder = CatchUpResponder::new();
        responder.begin(PeerId(1), SeqNum(2), Some(SeqNum(6)));

        let batch = responder.next_batch(&sync, 10);
        let seqs: Vec<u64> = batch.iter().map(|(_, c)| c.seq.0).collect();
        assert_eq!(seqs, vec![2, 3, 4, 5]);
        assert!(responder.is_idle());
    }
}
