//! Group-agreement protocol state machine.
//!
//! Composes the vote machine, clock synchronizer, command synchronizer and
//! leader election into one orchestrator per group:
//!
//! - membership state machine (New → Joining → SyncingState → SyncingClock
//!   → Active), with join approval by majority vote
//! - command-sequencing authority: only the leader converts requests and
//!   observations into numbered commands
//! - epoch lifecycle: periodic sequenced checkpoints seal epochs whose
//!   snapshots fast-forward late joiners
//! - heartbeat/term leader liveness with scheduled handover at epoch
//!   boundaries
//!
//! The orchestrator is a synchronous [`lockstep_core::StateMachine`]: the
//! runner owns all I/O.

mod config;
mod election;
mod epochs;
mod membership;
mod observations;
mod protocol;
mod votes;

pub use config::GroupConfig;
pub use election::{LeaderElection, LeaderSelection, RandomSelection, Role};
pub use epochs::EpochStore;
pub use membership::MemberTable;
pub use observations::ObservationSet;
pub use protocol::GroupProtocol;
pub use votes::{VoteMachine, VoteResult, VoteStatus};
