//! Multi-peer simulation driver.
//!
//! Owns one [`GroupProtocol`] per simulated peer plus the network, and does
//! everything a production runner would: executes returned actions, routes
//! deliveries, feeds per-pair clock samples and drives the periodic tick.
//! Each peer runs on its own skewed system clock.

use crate::{SimNetwork, TallyApp};
use lockstep_core::{Action, Event, Notification, StateMachine};
use lockstep_group::{GroupConfig, GroupProtocol};
use lockstep_types::{GroupInfo, PeerId};
use std::time::Duration;
use tracing::trace;

/// One simulated peer.
pub struct SimPeer {
    /// The protocol instance under test.
    pub protocol: GroupProtocol<TallyApp>,

    /// How far this peer's system clock runs ahead of simulation time.
    pub skew: Duration,

    /// Notifications the protocol surfaced to the (simulated) application.
    pub notifications: Vec<Notification>,
}

impl SimPeer {
    /// The peer's id.
    pub fn id(&self) -> PeerId {
        self.protocol.local_peer()
    }
}

/// A deterministic multi-peer run.
pub struct Simulation {
    info: GroupInfo,
    config: GroupConfig,
    network: SimNetwork,
    peers: Vec<SimPeer>,
    now: Duration,
    tick: Duration,
}

impl Simulation {
    /// Create a simulation. Peer RNG seeds are derived from the group
    /// config's seed plus the peer id, so runs replay identically.
    pub fn new(info: GroupInfo, config: GroupConfig, network: SimNetwork) -> Self {
        Self {
            info,
            config,
            network,
            peers: Vec::new(),
            now: Duration::ZERO,
            tick: Duration::from_millis(50),
        }
    }

    /// Override the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Add the peer that creates the group.
    pub fn add_creator(&mut self, peer: PeerId, app_data: &str, skew: Duration) {
        let protocol = GroupProtocol::create(
            self.info.clone(),
            peer,
            app_data,
            self.peer_config(peer),
            TallyApp::new(),
        );
        self.push_peer(protocol, skew);
    }

    /// Add a peer that joins the existing group.
    pub fn add_joiner(&mut self, peer: PeerId, app_data: &str, skew: Duration) {
        let protocol = GroupProtocol::join(
            self.info.clone(),
            peer,
            app_data,
            self.peer_config(peer),
            TallyApp::new(),
        );
        self.push_peer(protocol, skew);
    }

    /// Remove a peer abruptly, as if its process died.
    pub fn remove_peer(&mut self, peer: PeerId) {
        let Some(index) = self.index_of(peer) else {
            return;
        };
        self.peers.remove(index);
        self.network.drop_peer(peer);
        for i in 0..self.peers.len() {
            self.dispatch(i, Event::PeerLeftNetwork { peer });
        }
    }

    /// Submit an application request at one peer.
    pub fn submit_request(&mut self, peer: PeerId, payload: Vec<u8>) {
        if let Some(index) = self.index_of(peer) {
            self.dispatch(index, Event::SubmitRequest { payload });
        }
    }

    /// Submit an application observation at one peer.
    pub fn submit_observation(&mut self, peer: PeerId, payload: Vec<u8>) {
        if let Some(index) = self.index_of(peer) {
            self.dispatch(index, Event::SubmitObservation { payload });
        }
    }

    /// Advance the simulation by `duration`.
    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Look up a peer.
    pub fn peer(&self, peer: PeerId) -> &SimPeer {
        self.peers
            .iter()
            .find(|p| p.id() == peer)
            .expect("unknown peer")
    }

    /// All peers.
    pub fn peers(&self) -> &[SimPeer] {
        &self.peers
    }

    /// Whether every peer is Active with the same applied position and the
    /// same application state.
    pub fn converged(&self) -> bool {
        let Some(first) = self.peers.first() else {
            return true;
        };
        self.peers.iter().all(|p| {
            p.protocol.local_status().is_active()
                && p.protocol.applied_seq() == first.protocol.applied_seq()
                && p.protocol.app() == first.protocol.app()
        })
    }

    fn peer_config(&self, peer: PeerId) -> GroupConfig {
        let mut config = self.config.clone();
        config.seed = config.seed.wrapping_add(peer.0);
        config
    }

    fn push_peer(&mut self, protocol: GroupProtocol<TallyApp>, skew: Duration) {
        self.peers.push(SimPeer {
            protocol,
            skew,
            notifications: Vec::new(),
        });
    }

    fn index_of(&self, peer: PeerId) -> Option<usize> {
        self.peers.iter().position(|p| p.id() == peer)
    }

    fn step(&mut self) {
        self.now += self.tick;

        for delivery in self.network.drain_due(self.now) {
            if let Some(index) = self.index_of(delivery.to) {
                self.dispatch(
                    index,
                    Event::MessageReceived {
                        from: delivery.from,
                        envelope: delivery.envelope,
                    },
                );
            }
        }

        // The transport's clock estimates: each peer learns every other
        // peer's system-clock offset relative to its own.
        let skews: Vec<(PeerId, i64)> = self
            .peers
            .iter()
            .map(|p| (p.id(), p.skew.as_millis() as i64))
            .collect();
        for index in 0..self.peers.len() {
            let (local, local_skew) = skews[index];
            for &(peer, skew) in &skews {
                if peer != local {
                    self.dispatch(
                        index,
                        Event::SystemOffsetSample {
                            peer,
                            offset_ms: skew - local_skew,
                            lag_ms: 0,
                        },
                    );
                }
            }
            self.dispatch(index, Event::Tick);
        }
    }

    fn dispatch(&mut self, index: usize, event: Event) {
        let local = self.peers[index].id();
        let local_time = self.now + self.peers[index].skew;
        self.peers[index].protocol.set_time(local_time);
        let actions = self.peers[index].protocol.handle(event);
        if actions.is_empty() {
            return;
        }

        let ids: Vec<PeerId> = self.peers.iter().map(|p| p.id()).collect();
        for action in actions {
            trace!(%local, ?action, "executing action");
            match action {
                Action::Broadcast { envelope } => {
                    self.network.broadcast(self.now, local, &ids, &envelope);
                }
                Action::Unicast { to, envelope } => {
                    self.network.unicast(self.now, local, to, envelope);
                }
                Action::Notify(notification) => {
                    self.peers[index].notifications.push(notification);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NetworkConfig;
    use lockstep_types::{GroupId, MemberStatus};

    #[test]
    fn lone_creator_is_a_stable_group_of_one() {
        let info = GroupInfo::new(GroupId::new("solo"), "solo", PeerId(1));
        let mut sim = Simulation::new(
            info,
            GroupConfig::default(),
            SimNetwork::new(NetworkConfig::default()),
        );
        sim.add_creator(PeerId(1), "alice", Duration::ZERO);
        sim.run_for(Duration::from_secs(5));

        let peer = sim.peer(PeerId(1));
        assert!(peer.protocol.is_leader());
        assert_eq!(peer.protocol.local_status(), MemberStatus::Active);
        assert_eq!(peer.protocol.term(), 0);
        assert!(peer.protocol.group_time().is_some());
    }
}
