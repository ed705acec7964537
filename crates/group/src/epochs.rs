//! Epoch lifecycle: one open epoch at a time, sealed by sequenced
//! checkpoints, with a bounded retention window.

use lockstep_types::{Epoch, EpochNum, GroupTime, Hash, PeerId, SeqNum};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Sealed-epoch store plus the currently open epoch.
#[derive(Debug)]
pub struct EpochStore {
    open: EpochNum,
    open_start_seq: SeqNum,
    sealed: BTreeMap<u64, Epoch>,
    retained: usize,

    // Advisory checkpoint digests reported by peers, keyed by checkpoint
    // sequence number.
    // TODO: reports are never compared against the leader's own hash, so a
    // diverging peer goes unnoticed. Surfacing a divergence notification
    // needs a policy for which state is canonical first.
    reports: BTreeMap<u64, BTreeMap<PeerId, Hash>>,
}

impl EpochStore {
    /// Create a store with epoch 0 open at the first sequence number.
    pub fn new(retained: usize) -> Self {
        Self {
            open: EpochNum::GENESIS,
            open_start_seq: SeqNum::FIRST,
            sealed: BTreeMap::new(),
            retained: retained.max(1),
            reports: BTreeMap::new(),
        }
    }

    /// The currently open epoch.
    pub fn open_epoch(&self) -> EpochNum {
        self.open
    }

    /// Seal the open epoch at a checkpoint and open the next one.
    ///
    /// Epochs are immutable once sealed; older ones beyond the retention
    /// window are pruned together with their advisory reports.
    pub fn seal(
        &mut self,
        end_seq: SeqNum,
        sealed_at: GroupTime,
        end_state_hash: Hash,
        snapshot: Vec<u8>,
    ) -> &Epoch {
        let epoch = Epoch {
            num: self.open,
            start_seq: self.open_start_seq,
            end_seq,
            sealed_at,
            end_state_hash,
            snapshot,
        };
        info!(num = %epoch.num, start = %epoch.start_seq, end = %epoch.end_seq, "epoch sealed");

        let key = epoch.num.0;
        self.sealed.insert(key, epoch);
        self.open = self.open.next();
        self.open_start_seq = end_seq.next();
        self.prune();
        &self.sealed[&key]
    }

    /// Adopt a sealed epoch received as catch-up data, fast-forwarding the
    /// open epoch past it.
    pub fn adopt(&mut self, epoch: Epoch) {
        debug!(num = %epoch.num, "adopting synced epoch");
        self.open = epoch.num.next();
        self.open_start_seq = epoch.end_seq.next();
        self.sealed.insert(epoch.num.0, epoch);
        self.prune();
    }

    /// The most recently sealed epoch.
    pub fn latest_sealed(&self) -> Option<&Epoch> {
        self.sealed.values().next_back()
    }

    /// The most recent sealed epoch whose snapshot covers part of the gap
    /// of a peer expecting `expected_seq` next.
    pub fn snapshot_covering(&self, expected_seq: SeqNum) -> Option<&Epoch> {
        let latest = self.latest_sealed()?;
        (latest.end_seq >= expected_seq).then_some(latest)
    }

    /// First sequence number still covered by a retained epoch; commands
    /// below it can be pruned from the applied log.
    pub fn oldest_retained_seq(&self) -> Option<SeqNum> {
        self.sealed.values().next().map(|e| e.start_seq)
    }

    /// Record a peer's advisory checkpoint digest.
    pub fn record_report(&mut self, seq: SeqNum, peer: PeerId, hash: Hash) {
        self.reports.entry(seq.0).or_default().insert(peer, hash);
    }

    /// Advisory digests reported for a checkpoint, if any.
    pub fn reports_for(&self, seq: SeqNum) -> Option<&BTreeMap<PeerId, Hash>> {
        self.reports.get(&seq.0)
    }

    fn prune(&mut self) {
        while self.sealed.len() > self.retained {
            if let Some((&num, _)) = self.sealed.iter().next() {
                self.sealed.remove(&num);
            }
        }
        if let Some(oldest) = self.oldest_retained_seq() {
            self.reports.retain(|&seq, _| seq >= oldest.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EpochStore {
        EpochStore::new(2)
    }

    #[test]
    fn sealing_advances_the_open_epoch() {
        let mut s = store();
        assert_eq!(s.open_epoch(), EpochNum(0));

        let e = s.seal(SeqNum(4), GroupTime(100), Hash::from_bytes(b"a"), vec![1]);
        assert_eq!(e.num, EpochNum(0));
        assert_eq!(e.start_seq, SeqNum(0));
        assert_eq!(e.end_seq, SeqNum(4));

        assert_eq!(s.open_epoch(), EpochNum(1));
        let e = s.seal(SeqNum(9), GroupTime(200), Hash::from_bytes(b"b"), vec![2]);
        assert_eq!(e.start_seq, SeqNum(5));
    }

    #[test]
    fn retention_window_prunes_old_epochs() {
        let mut s = store();
        s.seal(SeqNum(4), GroupTime(1), Hash::ZERO, vec![]);
        s.seal(SeqNum(9), GroupTime(2), Hash::ZERO, vec![]);
        s.seal(SeqNum(14), GroupTime(3), Hash::ZERO, vec![]);

        assert_eq!(s.oldest_retained_seq(), Some(SeqNum(5)));
        assert_eq!(s.latest_sealed().unwrap().num, EpochNum(2));
    }

    #[test]
    fn snapshot_covering_checks_the_gap() {
        let mut s = store();
        s.seal(SeqNum(9), GroupTime(1), Hash::ZERO, vec![]);

        // A peer expecting 5 is covered by the epoch ending at 9.
        assert!(s.snapshot_covering(SeqNum(5)).is_some());
        assert!(s.snapshot_covering(SeqNum(9)).is_some());
        // A peer expecting 10 gains nothing from it.
        assert!(s.snapshot_covering(SeqNum(10)).is_none());
    }

    #[test]
    fn adopt_fast_forwards() {
        let mut s = store();
        s.adopt(Epoch {
            num: EpochNum(6),
            start_seq: SeqNum(50),
            end_seq: SeqNum(59),
            sealed_at: GroupTime(1_000),
            end_state_hash: Hash::ZERO,
            snapshot: vec![],
        });
        assert_eq!(s.open_epoch(), EpochNum(7));
        let e = s.seal(SeqNum(70), GroupTime(2_000), Hash::ZERO, vec![]);
        assert_eq!(e.start_seq, SeqNum(60));
    }

    #[test]
    fn advisory_reports_are_stored_and_pruned() {
        let mut s = store();
        s.seal(SeqNum(4), GroupTime(1), Hash::ZERO, vec![]);
        s.record_report(SeqNum(4), PeerId(2), Hash::from_bytes(b"x"));
        assert_eq!(s.reports_for(SeqNum(4)).unwrap().len(), 1);

        s.seal(SeqNum(9), GroupTime(2), Hash::ZERO, vec![]);
        s.seal(SeqNum(14), GroupTime(3), Hash::ZERO, vec![]);
        assert!(s.reports_for(SeqNum(4)).is_none());
    }
}
