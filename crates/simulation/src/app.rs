//! A deterministic counter application for exercising the protocol.

use lockstep_core::{AppCore, PairwiseValidation};
use lockstep_types::{GroupTime, Hash, SeqNum};
use std::collections::BTreeMap;

/// A command or observation payload: add `delta` to counter `key`.
///
/// Wire form is 9 bytes: the key followed by the delta, little endian.
pub fn tally_op(key: u8, delta: i64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9);
    payload.push(key);
    payload.extend_from_slice(&delta.to_le_bytes());
    payload
}

/// Counters keyed by a single byte.
///
/// Every operation is a commutative-looking add, but the state digest covers
/// the full map, so any divergence in applied commands shows up in the
/// checkpoint hash.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TallyApp {
    counters: BTreeMap<u8, i64>,
}

impl TallyApp {
    /// Create an empty app.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one counter.
    pub fn counter(&self, key: u8) -> i64 {
        self.counters.get(&key).copied().unwrap_or(0)
    }

    /// All counters.
    pub fn counters(&self) -> &BTreeMap<u8, i64> {
        &self.counters
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.counters.len() * 9);
        for (&key, &value) in &self.counters {
            out.push(key);
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

impl AppCore for TallyApp {
    fn apply_command(&mut self, _seq: SeqNum, payload: &[u8]) {
        if payload.len() != 9 {
            return;
        }
        let key = payload[0];
        let delta = i64::from_le_bytes(payload[1..9].try_into().unwrap());
        *self.counters.entry(key).or_insert(0) += delta;
    }

    fn checkpoint(&mut self, _seq: SeqNum, _group_time: GroupTime) -> (Hash, Vec<u8>) {
        let state = self.encode();
        (Hash::from_bytes(&state), state)
    }

    fn restore(&mut self, state: &[u8]) {
        self.counters.clear();
        for chunk in state.chunks_exact(9) {
            let key = chunk[0];
            let value = i64::from_le_bytes(chunk[1..9].try_into().unwrap());
            self.counters.insert(key, value);
        }
    }

    /// Two observations of the same counter conflict; the later one loses.
    fn validate_pairwise(&self, prev: &[u8], test: &[u8]) -> PairwiseValidation {
        match (prev.first(), test.first()) {
            (Some(a), Some(b)) if a == b => PairwiseValidation::Invalidated,
            _ => PairwiseValidation::Unaffected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_and_reads_back() {
        let mut app = TallyApp::new();
        app.apply_command(SeqNum(0), &tally_op(3, 10));
        app.apply_command(SeqNum(1), &tally_op(3, -4));
        app.apply_command(SeqNum(2), &tally_op(7, 1));
        assert_eq!(app.counter(3), 6);
        assert_eq!(app.counter(7), 1);
        assert_eq!(app.counter(9), 0);
    }

    #[test]
    fn checkpoint_round_trips_through_restore() {
        let mut app = TallyApp::new();
        app.apply_command(SeqNum(0), &tally_op(1, 5));
        app.apply_command(SeqNum(1), &tally_op(200, -17));
        let (hash, state) = app.checkpoint(SeqNum(1), GroupTime(0));

        let mut other = TallyApp::new();
        other.restore(&state);
        assert_eq!(other, app);
        let (other_hash, _) = other.checkpoint(SeqNum(1), GroupTime(0));
        assert_eq!(other_hash, hash);
    }

    #[test]
    fn same_key_observations_conflict() {
        let app = TallyApp::new();
        assert_eq!(
            app.validate_pairwise(&tally_op(1, 2), &tally_op(1, 3)),
            PairwiseValidation::Invalidated
        );
        assert_eq!(
            app.validate_pairwise(&tally_op(1, 2), &tally_op(2, 3)),
            PairwiseValidation::Unaffected
        );
    }
}
