//! Observation batching and pre-submission conflict resolution.
//!
//! Observations are collected locally over a batching window, sorted by
//! timestamp, and filtered with the app-supplied pairwise validator so that
//! only a maximal non-conflicting ordered subset reaches the leader. The
//! observer resolves conflicts, not the leader.

use lockstep_core::{AppCore, PairwiseValidation};
use lockstep_messages::AppObservation;
use std::time::Duration;
use tracing::debug;

/// A batching window of locally made observations.
#[derive(Debug, Default)]
pub struct ObservationSet {
    window: Duration,
    pending: Vec<AppObservation>,
    deadline: Option<Duration>,
}

impl ObservationSet {
    /// Create a set with the given batching window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Add an observation. The first observation of a batch opens the
    /// window.
    pub fn add(&mut self, observation: AppObservation, now: Duration) {
        if self.pending.is_empty() {
            self.deadline = Some(now + self.window);
        }
        self.pending.push(observation);
    }

    /// Number of buffered observations.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Close the window if due and return the filtered batch, oldest first.
    ///
    /// Each candidate is validated against every already-accepted
    /// observation, not just the adjacent one; a candidate invalidated by
    /// any of them is dropped.
    pub fn flush_due(&mut self, now: Duration, app: &dyn AppCore) -> Option<Vec<AppObservation>> {
        if self.deadline? > now {
            return None;
        }
        self.deadline = None;

        let mut batch = std::mem::take(&mut self.pending);
        batch.sort_by_key(|o| o.observed_at);

        let mut accepted: Vec<AppObservation> = Vec::with_capacity(batch.len());
        for candidate in batch {
            let keep = accepted.iter().all(|prev| {
                !matches!(
                    app.validate_pairwise(&prev.payload, &candidate.payload),
                    PairwiseValidation::Invalidated
                )
            });
            if keep {
                accepted.push(candidate);
            } else {
                debug!(observed_at = %candidate.observed_at, "observation invalidated by earlier accepted one");
            }
        }
        Some(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::{GroupTime, Hash, SeqNum};

    // Validator: observations are single bytes; equal bytes conflict.
    struct ByteApp;

    impl AppCore for ByteApp {
        fn apply_command(&mut self, _seq: SeqNum, _payload: &[u8]) {}

        fn checkpoint(&mut self, _seq: SeqNum, _t: GroupTime) -> (Hash, Vec<u8>) {
            (Hash::ZERO, Vec::new())
        }

        fn restore(&mut self, _state: &[u8]) {}

        fn validate_pairwise(&self, prev: &[u8], test: &[u8]) -> PairwiseValidation {
            if prev == test {
                PairwiseValidation::Invalidated
            } else {
                PairwiseValidation::Unaffected
            }
        }
    }

    fn obs(at: i64, byte: u8) -> AppObservation {
        AppObservation {
            observed_at: GroupTime(at),
            payload: vec![byte],
        }
    }

    #[test]
    fn window_opens_on_first_observation() {
        let mut set = ObservationSet::new(Duration::from_millis(100));
        assert!(set.flush_due(Duration::from_secs(9), &ByteApp).is_none());

        set.add(obs(5, 1), Duration::from_secs(10));
        assert!(set
            .flush_due(Duration::from_millis(10_099), &ByteApp)
            .is_none());
        let batch = set.flush_due(Duration::from_millis(10_100), &ByteApp).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn batch_is_sorted_and_filtered() {
        let mut set = ObservationSet::new(Duration::ZERO);
        let now = Duration::from_secs(1);
        set.add(obs(30, 3), now);
        set.add(obs(10, 1), now);
        set.add(obs(20, 1), now); // conflicts with the observation at t=10
        set.add(obs(25, 2), now);

        let batch = set.flush_due(now, &ByteApp).unwrap();
        let order: Vec<i64> = batch.iter().map(|o| o.observed_at.0).collect();
        assert_eq!(order, vec![10, 25, 30]);
    }

    #[test]
    fn conflict_with_any_accepted_observation_drops_the_candidate() {
        let mut set = ObservationSet::new(Duration::ZERO);
        let now = Duration::from_secs(1);
        set.add(obs(10, 1), now);
        set.add(obs(20, 2), now);
        // Conflicts with the accepted observation at t=10, even though the
        // most recently accepted one is unrelated.
        set.add(obs(30, 1), now);

        let batch = set.flush_due(now, &ByteApp).unwrap();
        let order: Vec<i64> = batch.iter().map(|o| o.observed_at.0).collect();
        assert_eq!(order, vec![10, 20]);
    }
}
