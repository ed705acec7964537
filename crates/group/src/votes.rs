//! Generic majority-vote-with-timeout machine.
//!
//! Tracks one vote record per candidate. A vote is won the moment yes-votes
//! reach ⌊N/2⌋+1 and lost at expiry otherwise; finished results are consumed
//! on first read so the caller acts on them exactly once.

use lockstep_types::PeerId;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tracing::debug;

/// Status of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    /// Still collecting votes.
    Voting,
    /// Majority reached before expiry.
    Won,
    /// Expired short of a majority.
    Lost,
    /// No record for this candidate.
    NotFound,
}

/// Result of a vote lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResult {
    /// A finished result was already read once; the caller should treat the
    /// outcome as handled.
    pub already_consumed: bool,

    /// Current status, evaluated lazily against the expiry time.
    pub status: VoteStatus,

    /// Yes-votes registered so far.
    pub yes_votes: usize,

    /// When the first vote arrived.
    pub first_vote_at: Duration,
}

#[derive(Debug)]
struct VoteRecord {
    needed: usize,
    // TODO: votes are appended without deduplicating by voter, so one
    // repeating voter can satisfy the majority alone. Join approval depends
    // on the current count semantics; dedup by voter set when that path is
    // revisited.
    voters: Vec<PeerId>,
    first_vote_at: Duration,
    expiry: Duration,
    cleanup: Duration,
    consumed: bool,
}

impl VoteRecord {
    fn status(&self, now: Duration) -> VoteStatus {
        if self.voters.len() >= self.needed {
            VoteStatus::Won
        } else if now >= self.expiry {
            VoteStatus::Lost
        } else {
            VoteStatus::Voting
        }
    }
}

/// Majority-vote tracker, generic over the candidate key.
///
/// Owns its records exclusively; records past their cleanup time are purged
/// on any call.
#[derive(Debug)]
pub struct VoteMachine<C> {
    records: HashMap<C, VoteRecord>,
    timeout: Duration,
    cleanup_window: Duration,
}

impl<C: Eq + Hash + Clone + std::fmt::Debug> VoteMachine<C> {
    /// Create a vote machine.
    ///
    /// `timeout` bounds how long a vote may run; `cleanup_window` bounds how
    /// long a finished record lingers for late lookups.
    pub fn new(timeout: Duration, cleanup_window: Duration) -> Self {
        Self {
            records: HashMap::new(),
            timeout,
            cleanup_window,
        }
    }

    /// Register a yes-vote for a candidate.
    ///
    /// The first vote creates the record with `needed = total_peers/2 + 1`;
    /// later votes add to it while it is still open. Votes arriving after
    /// expiry are ignored.
    pub fn add_vote(&mut self, candidate: C, voter: PeerId, msg_time: Duration, total_peers: usize) {
        self.purge(msg_time);

        let record = self.records.entry(candidate.clone()).or_insert_with(|| {
            debug!(?candidate, total_peers, "vote opened");
            VoteRecord {
                needed: total_peers / 2 + 1,
                voters: Vec::new(),
                first_vote_at: msg_time,
                expiry: msg_time + self.timeout,
                cleanup: msg_time + self.cleanup_window,
                consumed: false,
            }
        });

        if record.status(msg_time) == VoteStatus::Lost {
            debug!(?candidate, %voter, "vote after expiry ignored");
            return;
        }
        record.voters.push(voter);
    }

    /// Look up a candidate's vote, evaluating expiry lazily.
    ///
    /// A finished (Won/Lost) result is marked consumed unless `peek` is set,
    /// so a second read reports `already_consumed` and the caller treats it
    /// as handled.
    pub fn result(&mut self, candidate: &C, now: Duration, peek: bool) -> VoteResult {
        self.purge(now);

        let Some(record) = self.records.get_mut(candidate) else {
            return VoteResult {
                already_consumed: false,
                status: VoteStatus::NotFound,
                yes_votes: 0,
                first_vote_at: Duration::ZERO,
            };
        };

        let status = record.status(now);
        let already_consumed = record.consumed;
        if !peek && !record.consumed && matches!(status, VoteStatus::Won | VoteStatus::Lost) {
            record.consumed = true;
        }

        VoteResult {
            already_consumed,
            status,
            yes_votes: record.voters.len(),
            first_vote_at: record.first_vote_at,
        }
    }

    /// Drop a candidate's record outright (e.g. the candidate departed).
    pub fn forget(&mut self, candidate: &C) {
        self.records.remove(candidate);
    }

    fn purge(&mut self, now: Duration) {
        self.records.retain(|_, r| now < r.cleanup);
    }
}
