//! Core traits: the state machine contract and the app-core collaborator.

use crate::{Action, Event};
use lockstep_types::{GroupTime, Hash, SeqNum};
use std::time::Duration;

/// A state machine that processes events.
///
/// All protocol logic is implemented as state machines that are:
///
/// - **Synchronous**: no async, no `.await`, no blocking
/// - **Deterministic**: same state + event = same actions
/// - **Pure-ish**: mutates self, but performs no I/O
///
/// The runner drives periodic [`Event::Tick`]s at simulation cadence; all
/// message handling, vote evaluation and timer checks happen inside that
/// tick, so exactly one logical thread ever touches a group's state.
pub trait StateMachine {
    /// Process an event, returning actions for the runner to execute.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current local time.
    ///
    /// Called by the runner before each `handle()` call. Local time is a
    /// monotonic duration since process start; the shared group timeline is
    /// derived from it by the clock synchronizer.
    fn set_time(&mut self, now: Duration);

    /// Get the time last set via `set_time()`.
    fn now(&self) -> Duration;
}

/// Result of pairwise observation validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairwiseValidation {
    /// The observations are independent; keep both.
    Unaffected,
    /// The later observation is consistent with the earlier one; keep it.
    Validated,
    /// The later observation conflicts with the earlier one; drop it.
    Invalidated,
}

/// The application's deterministic simulation core.
///
/// The protocol guarantees every peer applies the same commands in the same
/// order; the app core guarantees that doing so yields the same state.
pub trait AppCore {
    /// Apply a sequenced application command.
    fn apply_command(&mut self, seq: SeqNum, payload: &[u8]);

    /// Snapshot the application state at an epoch boundary.
    ///
    /// Returns an advisory digest and the serialized state.
    fn checkpoint(&mut self, seq: SeqNum, group_time: GroupTime) -> (Hash, Vec<u8>);

    /// Replace the application state wholesale with a snapshot.
    fn restore(&mut self, state: &[u8]);

    /// Judge whether a later observation conflicts with an earlier one.
    ///
    /// Used by observers to forward only a maximal non-conflicting ordered
    /// subset of their observation batch to the leader.
    fn validate_pairwise(&self, prev: &[u8], test: &[u8]) -> PairwiseValidation;
}
