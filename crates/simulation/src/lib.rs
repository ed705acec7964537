//! Deterministic multi-peer simulation of the lockstep protocol.
//!
//! Runs several [`lockstep_group::GroupProtocol`] instances against an
//! in-memory network with seeded latency, jitter and duplication. With the
//! same seeds, a run replays event-for-event, which makes protocol-level
//! failures reproducible.

mod app;
mod network;
mod runner;

pub use app::{tally_op, TallyApp};
pub use network::{Delivery, NetworkConfig, SimNetwork};
pub use runner::{SimPeer, Simulation};
