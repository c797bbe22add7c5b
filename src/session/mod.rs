//! Session wiring: one authority host, its client hosts and the links
//! between them

pub mod host;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{NetConfig, Tuning};
use crate::game::entity::{EntityId, PeerId};
use crate::game::math::Vec3;
use crate::game::world::Services;
use crate::net::{Outgoing, Route, Transport};

pub use host::Host;

/// Builds the collaborators of each host as it joins
pub type ServicesFactory = Box<dyn Fn(PeerId) -> Services + Send + Sync>;

/// Distance between spawn points of consecutive characters
const SPAWN_SPACING: f32 = 300.0;

/// Counters exposed by the diagnostics endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub time_secs: f64,
    pub ticks: u64,
    pub peers: usize,
    pub characters: usize,
    pub projectiles: usize,
    pub shots_fired: u64,
    pub calls_sent: u64,
    pub calls_rejected: u64,
    pub messages_delivered: u64,
    pub messages_in_flight: usize,
    pub decode_failures: u64,
}

pub struct Session {
    server: Host,
    clients: BTreeMap<PeerId, Host>,
    characters: BTreeMap<PeerId, EntityId>,
    transport: Transport,
    tuning: Tuning,
    net: NetConfig,
    seed: u64,
    services: ServicesFactory,
    time: f64,
    ticks: u64,
    next_peer: u32,
    spawned: u32,
    shots_fired: Arc<AtomicU64>,
}

impl Session {
    pub fn new(tuning: Tuning, net: NetConfig, seed: u64, services: ServicesFactory) -> Self {
        let mut server = Host::new(
            PeerId::SERVER,
            tuning.clone(),
            net.call_rate_limit,
            seed,
            services(PeerId::SERVER),
        );

        let shots_fired = Arc::new(AtomicU64::new(0));
        let counter = shots_fired.clone();
        server.events.fired.subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        Self {
            server,
            clients: BTreeMap::new(),
            characters: BTreeMap::new(),
            transport: Transport::new(net.latency_ms, net.jitter_ms, seed),
            tuning,
            net,
            seed,
            services,
            time: 0.0,
            ticks: 0,
            next_peer: 1,
            spawned: 0,
            shots_fired,
        }
    }

    /// Spawn the listen host's own character
    pub fn spawn_host_player(&mut self) -> EntityId {
        let location = self.next_spawn_point();
        let character = self.server.spawn_character(Some(PeerId::SERVER), location);
        self.characters.insert(PeerId::SERVER, character);
        character
    }

    /// Join a new client host and spawn its character on the authority
    pub fn connect_peer(&mut self) -> PeerId {
        let peer = PeerId(self.next_peer);
        self.next_peer += 1;

        let mut client = Host::new(
            peer,
            self.tuning.clone(),
            self.net.call_rate_limit,
            self.seed ^ u64::from(peer.0),
            (self.services)(peer),
        );
        client.clock.set(self.time);
        self.clients.insert(peer, client);

        self.server.add_peer(peer);
        let location = self.next_spawn_point();
        let character = self.server.spawn_character(Some(peer), location);
        self.characters.insert(peer, character);
        peer
    }

    pub fn disconnect_peer(&mut self, peer: PeerId) -> bool {
        if self.clients.remove(&peer).is_none() {
            return false;
        }
        self.characters.remove(&peer);
        self.server.remove_peer(peer);
        self.transport.disconnect(peer);
        true
    }

    fn next_spawn_point(&mut self) -> Vec3 {
        let location = Vec3::new(0.0, self.spawned as f32 * SPAWN_SPACING, 0.0);
        self.spawned += 1;
        location
    }

    /// Character the authority spawned for `peer`
    pub fn character_of(&self, peer: PeerId) -> Option<EntityId> {
        self.characters.get(&peer).copied()
    }

    pub fn server(&self) -> &Host {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Host {
        &mut self.server
    }

    pub fn host(&self, peer: PeerId) -> Option<&Host> {
        if peer.is_server() {
            Some(&self.server)
        } else {
            self.clients.get(&peer)
        }
    }

    pub fn host_mut(&mut self, peer: PeerId) -> Option<&mut Host> {
        if peer.is_server() {
            Some(&mut self.server)
        } else {
            self.clients.get_mut(&peer)
        }
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.clients.keys().copied().collect()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// One session step: every host ticks, the authority collects
    /// replication, outboxes go onto the links and due messages are handed
    /// to their receivers.
    pub fn tick(&mut self, dt: f64) {
        self.time += dt.max(0.0);
        self.ticks += 1;

        self.server.tick(dt);
        for client in self.clients.values_mut() {
            client.tick(dt);
        }

        self.server.collect_replication();
        self.flush_outboxes();

        for delivery in self.transport.deliver_due(self.time) {
            match self.host_mut(delivery.to) {
                Some(host) => host.receive(delivery.from, delivery.message),
                None => debug!(to = %delivery.to, "Delivery for a host that left"),
            }
        }
    }

    /// Tick at `dt` until `seconds` of session time have passed
    pub fn run_for(&mut self, seconds: f64, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let steps = (seconds / dt).round() as u64;
        for _ in 0..steps {
            self.tick(dt);
        }
    }

    fn flush_outboxes(&mut self) {
        let mut queued: Vec<(PeerId, Outgoing)> = self
            .server
            .drain_outbox()
            .into_iter()
            .map(|o| (PeerId::SERVER, o))
            .collect();
        for (peer, client) in self.clients.iter_mut() {
            queued.extend(client.drain_outbox().into_iter().map(|o| (*peer, o)));
        }

        let connected: Vec<PeerId> = self.clients.keys().copied().collect();
        for (from, outgoing) in queued {
            let receivers: Vec<PeerId> = match outgoing.route {
                Route::Server => vec![PeerId::SERVER],
                Route::Peer(peer) => vec![peer],
                Route::AllPeers => connected.clone(),
            };
            for to in receivers {
                if to == from || !(to.is_server() || self.clients.contains_key(&to)) {
                    continue;
                }
                if let Err(e) =
                    self.transport
                        .send(from, to, outgoing.lane, &outgoing.message, self.time)
                {
                    warn!(from = %from, to = %to, error = %e, "Message not sent");
                }
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        let calls_sent = self.server.calls_sent()
            + self.clients.values().map(Host::calls_sent).sum::<u64>();
        SessionStats {
            time_secs: self.time,
            ticks: self.ticks,
            peers: self.clients.len(),
            characters: self.server.character_count(),
            projectiles: self.server.projectile_count(),
            shots_fired: self.shots_fired.load(Ordering::Relaxed),
            calls_sent,
            calls_rejected: self.server.calls_rejected(),
            messages_delivered: self.transport.delivered(),
            messages_in_flight: self.transport.in_flight(),
            decode_failures: self.transport.decode_failures(),
        }
    }

    /// Log a one-line summary of the session
    pub fn log_summary(&self) {
        let stats = self.stats();
        info!(
            time_secs = stats.time_secs,
            peers = stats.peers,
            characters = stats.characters,
            projectiles = stats.projectiles,
            shots_fired = stats.shots_fired,
            calls_rejected = stats.calls_rejected,
            "Session status"
        );
    }
}
