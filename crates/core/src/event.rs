//! Inbound events consumed by protocol state machines.

use crate::RequestId;
use lockstep_messages::Envelope;
use lockstep_types::PeerId;

/// Everything that can happen to a protocol instance.
///
/// Transport callbacks, inbound messages, locally submitted application
/// traffic and the periodic tick all arrive through this one type.
#[derive(Debug, Clone)]
pub enum Event {
    /// Periodic update, driven by the runner at simulation cadence.
    Tick,

    /// A message arrived from a peer.
    MessageReceived {
        /// Transport-authenticated sender.
        from: PeerId,
        /// The addressed payload.
        envelope: Envelope,
    },

    /// Transport reports a peer connected to the network.
    PeerJoinedNetwork { peer: PeerId },

    /// Transport reports a peer left the network for good.
    PeerLeftNetwork { peer: PeerId },

    /// Transport reports a peer stopped responding.
    PeerMissing { peer: PeerId },

    /// Transport reports a missing peer is responding again.
    PeerReturned { peer: PeerId },

    /// Raw per-peer clock sample from the transport: the estimated offset of
    /// the peer's system clock from ours, and the measured network lag.
    SystemOffsetSample {
        peer: PeerId,
        offset_ms: i64,
        lag_ms: i64,
    },

    /// The local application submits a request for sequencing.
    SubmitRequest { payload: Vec<u8> },

    /// The local application submits an observation for batching, conflict
    /// filtering and eventual sequencing.
    SubmitObservation { payload: Vec<u8> },

    /// The local application asks for the list of reachable groups.
    ///
    /// A single result slot: a second request while one is pending fails.
    RequestGroups { request_id: RequestId },
}
