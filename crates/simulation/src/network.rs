//! Deterministic in-memory message transport.
//!
//! Deliveries are delayed by a seeded random latency and occasionally
//! duplicated, so peers see realistic cross-sender reordering while every
//! run with the same seed replays identically. Like the reliable channels a
//! production transport rides on, delivery order is preserved per sender
//! and receiver pair.

use lockstep_messages::Envelope;
use lockstep_types::PeerId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::Duration;

/// Transport behavior knobs.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way delivery latency.
    pub latency: Duration,

    /// Extra random latency, uniform in `0..=jitter`.
    pub jitter: Duration,

    /// Probability that a delivery is duplicated with fresh latency.
    pub duplicate_chance: f64,

    /// RNG seed.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(30),
            jitter: Duration::from_millis(40),
            duplicate_chance: 0.0,
            seed: 0,
        }
    }
}

/// One delivery waiting for its due time.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// When the delivery becomes visible to the receiver.
    pub due: Duration,

    /// Transport-authenticated sender.
    pub from: PeerId,

    /// Receiver.
    pub to: PeerId,

    /// The addressed payload.
    pub envelope: Envelope,
}

/// The simulated network.
#[derive(Debug)]
pub struct SimNetwork {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    pending: Vec<Delivery>,
    // Monotonic tiebreaker so draining is stable across equal due times.
    next_stamp: u64,
    stamps: Vec<u64>,
    // Per (from, to) pair: due time of the last queued delivery, so the
    // channel stays ordered.
    last_due: BTreeMap<(u64, u64), Duration>,
}

impl SimNetwork {
    /// Create a network.
    pub fn new(config: NetworkConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            pending: Vec::new(),
            next_stamp: 0,
            stamps: Vec::new(),
            last_due: BTreeMap::new(),
        }
    }

    /// Queue a broadcast to every listed peer, the sender included.
    pub fn broadcast(&mut self, now: Duration, from: PeerId, peers: &[PeerId], envelope: &Envelope) {
        for &to in peers {
            self.unicast(now, from, to, envelope.clone());
        }
    }

    /// Queue a unicast.
    pub fn unicast(&mut self, now: Duration, from: PeerId, to: PeerId, envelope: Envelope) {
        let due = now + self.delay();
        if self.config.duplicate_chance > 0.0 && self.rng.gen_bool(self.config.duplicate_chance) {
            let dup_due = now + self.delay();
            self.push(Delivery {
                due: dup_due,
                from,
                to,
                envelope: envelope.clone(),
            });
        }
        self.push(Delivery {
            due,
            from,
            to,
            envelope,
        });
    }

    /// Take every delivery due by `now`, in (due, queue) order.
    pub fn drain_due(&mut self, now: Duration) -> Vec<Delivery> {
        let mut due: Vec<(u64, Delivery)> = Vec::new();
        let mut keep = Vec::new();
        let mut keep_stamps = Vec::new();
        for (delivery, &stamp) in self.pending.drain(..).zip(self.stamps.iter()) {
            if delivery.due <= now {
                due.push((stamp, delivery));
            } else {
                keep.push(delivery);
                keep_stamps.push(stamp);
            }
        }
        self.pending = keep;
        self.stamps = keep_stamps;

        due.sort_by_key(|(stamp, d)| (d.due, *stamp));
        due.into_iter().map(|(_, d)| d).collect()
    }

    /// Drop everything addressed to a departed peer.
    pub fn drop_peer(&mut self, peer: PeerId) {
        let mut keep = Vec::new();
        let mut keep_stamps = Vec::new();
        for (delivery, &stamp) in self.pending.drain(..).zip(self.stamps.iter()) {
            if delivery.to != peer {
                keep.push(delivery);
                keep_stamps.push(stamp);
            }
        }
        self.pending = keep;
        self.stamps = keep_stamps;
    }

    /// Number of queued deliveries.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, mut delivery: Delivery) {
        let channel = (delivery.from.0, delivery.to.0);
        if let Some(&last) = self.last_due.get(&channel) {
            delivery.due = delivery.due.max(last);
        }
        self.last_due.insert(channel, delivery.due);
        self.pending.push(delivery);
        self.stamps.push(self.next_stamp);
        self.next_stamp += 1;
    }

    fn delay(&mut self) -> Duration {
        let jitter_ms = self.config.jitter.as_millis() as u64;
        self.config.latency + Duration::from_millis(self.rng.gen_range(0..=jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_messages::{GroupMessage, GroupsRequest};

    fn envelope() -> Envelope {
        Envelope::to_all(GroupMessage::GroupsRequest(GroupsRequest))
    }

    #[test]
    fn deliveries_respect_latency() {
        let mut net = SimNetwork::new(NetworkConfig {
            latency: Duration::from_millis(50),
            jitter: Duration::ZERO,
            ..NetworkConfig::default()
        });
        net.unicast(Duration::ZERO, PeerId(1), PeerId(2), envelope());

        assert!(net.drain_due(Duration::from_millis(49)).is_empty());
        let due = net.drain_due(Duration::from_millis(50));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].to, PeerId(2));
        assert_eq!(net.pending_count(), 0);
    }

    #[test]
    fn same_seed_replays_identically() {
        let run = |seed| {
            let mut net = SimNetwork::new(NetworkConfig {
                duplicate_chance: 0.3,
                seed,
                ..NetworkConfig::default()
            });
            for i in 0..20u64 {
                net.unicast(
                    Duration::from_millis(i * 10),
                    PeerId(1),
                    PeerId(2),
                    envelope(),
                );
            }
            net.drain_due(Duration::from_secs(10))
                .iter()
                .map(|d| d.due)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn channel_order_is_preserved_per_pair() {
        let mut net = SimNetwork::new(NetworkConfig {
            latency: Duration::from_millis(10),
            jitter: Duration::from_millis(200),
            seed: 3,
            ..NetworkConfig::default()
        });
        for i in 0..50u64 {
            let tagged = Envelope::to_all(GroupMessage::JoinVote(lockstep_messages::JoinVote {
                candidate: PeerId(i),
            }));
            net.unicast(Duration::ZERO, PeerId(1), PeerId(2), tagged);
        }
        let received: Vec<u64> = net
            .drain_due(Duration::from_secs(5))
            .iter()
            .filter_map(|d| match &d.envelope.message {
                GroupMessage::JoinVote(v) => Some(v.candidate.0),
                _ => None,
            })
            .collect();
        assert_eq!(received, (0..50).collect::<Vec<u64>>());
    }

    #[test]
    fn drop_peer_discards_queued_traffic() {
        let mut net = SimNetwork::new(NetworkConfig::default());
        net.broadcast(
            Duration::ZERO,
            PeerId(1),
            &[PeerId(1), PeerId(2), PeerId(3)],
            &envelope(),
        );
        net.drop_peer(PeerId(2));
        let due = net.drain_due(Duration::from_secs(1));
        assert_eq!(due.len(), 2);
        assert!(due.iter().all(|d| d.to != PeerId(2)));
    }
}
