//! In-memory transport between hosts
//!
//! Each directed link has a reliable lane (FIFO, never reorders) and an
//! unreliable lane (optional jitter, may reorder). Messages are JSON encoded
//! on send and decoded on delivery, like a real socket would carry them.

use std::collections::{HashMap, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::game::entity::PeerId;

use super::protocol::{Lane, NetMessage};

/// Transport failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
struct InFlight {
    deliver_at: f64,
    payload: String,
}

#[derive(Debug, Default)]
struct Link {
    reliable: VecDeque<InFlight>,
    unreliable: Vec<InFlight>,
    last_reliable_at: f64,
}

/// A message handed to its receiving host
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub from: PeerId,
    pub to: PeerId,
    pub message: NetMessage,
}

/// Simulated network between every pair of hosts in a session
pub struct Transport {
    latency: f64,
    jitter: f64,
    links: HashMap<(PeerId, PeerId), Link>,
    rng: ChaCha8Rng,
    delivered: u64,
    decode_failures: u64,
}

impl Transport {
    pub fn new(latency_ms: u64, jitter_ms: u64, seed: u64) -> Self {
        Self {
            latency: latency_ms as f64 / 1000.0,
            jitter: jitter_ms as f64 / 1000.0,
            links: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            delivered: 0,
            decode_failures: 0,
        }
    }

    pub fn send(
        &mut self,
        from: PeerId,
        to: PeerId,
        lane: Lane,
        message: &NetMessage,
        now: f64,
    ) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message).map_err(TransportError::Encode)?;
        self.send_raw(from, to, lane, payload, now);
        Ok(())
    }

    /// Queue an already encoded payload
    pub fn send_raw(&mut self, from: PeerId, to: PeerId, lane: Lane, payload: String, now: f64) {
        let mut deliver_at = now + self.latency;
        let link = self.links.entry((from, to)).or_default();
        match lane {
            Lane::Reliable => {
                // Never overtake an earlier reliable message on this link
                deliver_at = deliver_at.max(link.last_reliable_at);
                link.last_reliable_at = deliver_at;
                link.reliable.push_back(InFlight { deliver_at, payload });
            }
            Lane::Unreliable => {
                if self.jitter > 0.0 {
                    deliver_at += self.rng.gen_range(0.0..self.jitter);
                }
                link.unreliable.push(InFlight { deliver_at, payload });
            }
        }
    }

    /// Decode and return every message due at `now`. Reliable messages of a
    /// link come out in send order; undecodable payloads are dropped.
    pub fn deliver_due(&mut self, now: f64) -> Vec<Delivery> {
        let mut due = Vec::new();
        let mut keys: Vec<(PeerId, PeerId)> = self.links.keys().copied().collect();
        keys.sort();

        for (from, to) in keys {
            let Some(link) = self.links.get_mut(&(from, to)) else {
                continue;
            };
            while link.reliable.front().is_some_and(|m| m.deliver_at <= now) {
                if let Some(msg) = link.reliable.pop_front() {
                    due.push((from, to, msg.payload));
                }
            }
            let mut i = 0;
            while i < link.unreliable.len() {
                if link.unreliable[i].deliver_at <= now {
                    let msg = link.unreliable.swap_remove(i);
                    due.push((from, to, msg.payload));
                } else {
                    i += 1;
                }
            }
        }

        let mut out = Vec::with_capacity(due.len());
        for (from, to, payload) in due {
            match serde_json::from_str::<NetMessage>(&payload).map_err(TransportError::Decode) {
                Ok(message) => {
                    self.delivered += 1;
                    out.push(Delivery { from, to, message });
                }
                Err(e) => {
                    self.decode_failures += 1;
                    warn!(from = %from, to = %to, error = %e, "Dropping undecodable message");
                }
            }
        }
        out
    }

    /// Drop every link touching a disconnected peer
    pub fn disconnect(&mut self, peer: PeerId) {
        self.links.retain(|(from, to), _| *from != peer && *to != peer);
    }

    pub fn in_flight(&self) -> usize {
        self.links
            .values()
            .map(|l| l.reliable.len() + l.unreliable.len())
            .sum()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::EntityId;

    fn destroy(entity: EntityId) -> NetMessage {
        NetMessage::Destroy { entity }
    }

    #[test]
    fn messages_wait_for_latency() {
        let mut transport = Transport::new(100, 0, 1);
        let msg = destroy(EntityId::new());
        transport
            .send(PeerId(1), PeerId::SERVER, Lane::Reliable, &msg, 0.0)
            .unwrap();

        assert!(transport.deliver_due(0.05).is_empty());
        let delivered = transport.deliver_due(0.1);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message, msg);
        assert_eq!(delivered[0].from, PeerId(1));
        assert_eq!(transport.in_flight(), 0);
    }

    #[test]
    fn reliable_lane_preserves_sender_order() {
        let mut transport = Transport::new(20, 50, 9);
        let ids: Vec<EntityId> = (0..10).map(|_| EntityId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            transport
                .send(PeerId(1), PeerId::SERVER, Lane::Reliable, &destroy(*id), i as f64 * 0.001)
                .unwrap();
        }
        let delivered: Vec<EntityId> = transport
            .deliver_due(1.0)
            .into_iter()
            .map(|d| match d.message {
                NetMessage::Destroy { entity } => entity,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(delivered, ids);
    }

    #[test]
    fn garbage_payload_is_dropped() {
        let mut transport = Transport::new(0, 0, 1);
        transport.send_raw(PeerId(1), PeerId::SERVER, Lane::Reliable, "{not json".to_string(), 0.0);
        assert!(transport.deliver_due(1.0).is_empty());
        assert_eq!(transport.decode_failures(), 1);
    }

    #[test]
    fn disconnect_discards_links() {
        let mut transport = Transport::new(100, 0, 1);
        transport
            .send(PeerId::SERVER, PeerId(2), Lane::Reliable, &destroy(EntityId::new()), 0.0)
            .unwrap();
        transport.disconnect(PeerId(2));
        assert_eq!(transport.in_flight(), 0);
    }
}
