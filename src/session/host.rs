//! One participant's simulation
//!
//! A host owns its clock, its view of every entity, the replicated field
//! store and its end of the remote call channel. The authority host (peer 0)
//! also validates server calls and drains replication for every peer.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace, warn};

use crate::config::Tuning;
use crate::game::aim::{SERVER_SET_AIMING, SET_REMOTE_CONTROL_ROTATION};
use crate::game::character::{character_schema, Character, CURRENT_WEAPON};
use crate::game::damage::PointDamage;
use crate::game::entity::{role_for, Entity, EntityId, EntityKind, NetRole, PeerId};
use crate::game::events::{EventDelegate, FiredEvent};
use crate::game::fire::SERVER_FIRE;
use crate::game::math::Vec3;
use crate::game::projectile::{projectile_schema, Projectile, ProjectileClass, PROJECTILE_VELOCITY};
use crate::game::weapon::{weapon_schema, Weapon, HANDLE_SOCKET_NAME, MUZZLE_SOCKET_NAME};
use crate::game::world::Services;
use crate::net::{
    CallContext, CallOutcome, MulticastEvent, NetMessage, Outgoing, RemoteCallChannel, Route,
    ServerCall, SpawnInfo,
};
use crate::replication::{FieldStore, ReplicationError};
use crate::util::time::SimClock;

/// Observable events raised on this host
#[derive(Default)]
pub struct HostEvents {
    /// A projectile was launched (authority publish or multicast receipt)
    pub fired: EventDelegate<FiredEvent>,
    /// Point damage was handed to the damage system (authority only)
    pub damage_dispatched: EventDelegate<PointDamage>,
}

pub struct Host {
    pub(crate) peer: PeerId,
    pub(crate) clock: SimClock,
    pub(crate) tuning: Tuning,
    pub(crate) store: FieldStore,
    pub(crate) characters: HashMap<EntityId, Character>,
    pub(crate) weapons: HashMap<EntityId, Weapon>,
    pub(crate) projectiles: HashMap<EntityId, Projectile>,
    pub(crate) channel: RemoteCallChannel,
    pub(crate) services: Services,
    /// Spread sampling; only the authority draws from it
    pub(crate) rng: ChaCha8Rng,
    /// Connected remote peers (authority only)
    pub(crate) peers: Vec<PeerId>,
    pub events: HostEvents,
}

impl Host {
    pub fn new(
        peer: PeerId,
        tuning: Tuning,
        call_rate_limit: u32,
        seed: u64,
        services: Services,
    ) -> Self {
        let mut store = FieldStore::new();
        store.register_schema(character_schema());
        store.register_schema(weapon_schema());
        store.register_schema(projectile_schema());

        Self {
            peer,
            clock: SimClock::new(),
            tuning,
            store,
            characters: HashMap::new(),
            weapons: HashMap::new(),
            projectiles: HashMap::new(),
            channel: RemoteCallChannel::new(peer, call_rate_limit),
            services,
            rng: ChaCha8Rng::seed_from_u64(seed),
            peers: Vec::new(),
            events: HostEvents::default(),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn is_authority(&self) -> bool {
        self.peer.is_server()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Advance the clock and run everything that is due
    pub fn tick(&mut self, dt: f64) {
        self.clock.advance(dt);
        self.run_fire_loops();
        if self.is_authority() {
            self.expire_projectiles();
        }
    }

    fn expire_projectiles(&mut self) {
        let now = self.clock.now();
        let expired: Vec<EntityId> = self
            .projectiles
            .values()
            .filter(|p| p.is_expired(now))
            .map(Projectile::id)
            .collect();
        for id in expired {
            trace!(projectile = %id, "Projectile life span over");
            self.destroy_entity(id);
        }
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Spawn a character (and its weapon, when enabled). Authority only.
    pub fn spawn_character(&mut self, owning_peer: Option<PeerId>, location: Vec3) -> EntityId {
        let character = EntityId::new();
        self.spawn(SpawnInfo {
            id: character,
            kind: EntityKind::Character,
            owning_peer,
            owner: None,
            instigator: None,
            location,
            velocity: Vec3::ZERO,
        });

        if self.tuning.weapon_enabled {
            let weapon = EntityId::new();
            self.spawn(SpawnInfo {
                id: weapon,
                kind: EntityKind::Weapon,
                owning_peer,
                owner: Some(character),
                instigator: Some(character),
                location,
                velocity: Vec3::ZERO,
            });
            let handle = self.tuning.handle_socket_name.clone();
            let muzzle = self.tuning.muzzle_socket_name.clone();
            let writes = self
                .store
                .write(character, CURRENT_WEAPON, Some(weapon))
                .and_then(|_| self.store.write(weapon, HANDLE_SOCKET_NAME, handle))
                .and_then(|_| self.store.write(weapon, MUZZLE_SOCKET_NAME, muzzle));
            if let Err(e) = writes {
                warn!(entity = %character, error = %e, "Weapon attachment not replicated");
            }
        }

        info!(
            entity = %character,
            owning_peer = ?owning_peer,
            "Character spawned"
        );
        character
    }

    /// Spawn the projectile of one shot. Authority only.
    pub(crate) fn spawn_projectile(
        &mut self,
        weapon: EntityId,
        character: EntityId,
        location: Vec3,
        velocity: Vec3,
        class: ProjectileClass,
    ) -> EntityId {
        let projectile = EntityId::new();
        let owning_peer = self
            .characters
            .get(&character)
            .and_then(|c| c.entity.owning_peer);
        self.spawn(SpawnInfo {
            id: projectile,
            kind: EntityKind::Projectile,
            owning_peer,
            owner: Some(weapon),
            instigator: Some(character),
            location,
            velocity,
        });
        if let Some(p) = self.projectiles.get_mut(&projectile) {
            p.class = class;
        }
        if let Err(e) = self.store.write(projectile, PROJECTILE_VELOCITY, velocity) {
            debug!(projectile = %projectile, error = %e, "Projectile velocity not written");
        }
        projectile
    }

    /// Create the local entity and tell every peer about it
    fn spawn(&mut self, info: SpawnInfo) {
        if let Err(e) = self.insert_entity(&info) {
            warn!(entity = %info.id, error = %e, "Entity spawn failed");
            return;
        }
        if self.is_authority() {
            self.channel.push(Route::AllPeers, NetMessage::Spawn { info });
        }
    }

    fn insert_entity(&mut self, info: &SpawnInfo) -> Result<(), ReplicationError> {
        let role = role_for(self.peer, info.owning_peer);
        let entity = Entity {
            id: info.id,
            kind: info.kind,
            role,
            owning_peer: info.owning_peer,
            owner: info.owner,
            instigator: info.instigator,
        };
        self.store
            .insert_entity(info.id, info.kind, info.owning_peer, role == NetRole::Authority)?;

        match info.kind {
            EntityKind::Character => {
                self.characters
                    .insert(info.id, Character::new(entity, self.peer, info.location));
            }
            EntityKind::Weapon => {
                self.weapons.insert(info.id, Weapon::new(entity, &self.tuning));
            }
            EntityKind::Projectile => {
                let class = self.tuning.projectile.clone().unwrap_or_default();
                self.projectiles.insert(
                    info.id,
                    Projectile {
                        entity,
                        location: info.location,
                        velocity: info.velocity,
                        spawned_at: self.clock.now(),
                        class,
                    },
                );
            }
        }
        Ok(())
    }

    /// Remove an entity. A character takes its weapon with it.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        let removed = if self.characters.remove(&id).is_some() {
            let held: Vec<EntityId> = self
                .weapons
                .values()
                .filter(|w| w.owner() == Some(id))
                .map(Weapon::id)
                .collect();
            self.forget(id);
            for weapon in held {
                self.destroy_entity(weapon);
            }
            true
        } else if self.weapons.remove(&id).is_some() {
            self.forget(id);
            true
        } else if self.projectiles.remove(&id).is_some() {
            self.services.motion.stop(id);
            self.forget(id);
            true
        } else {
            false
        };

        if removed {
            debug!(entity = %id, "Entity destroyed");
        }
        removed
    }

    fn forget(&mut self, id: EntityId) {
        self.store.remove_entity(id);
        if self.is_authority() {
            self.channel.push(Route::AllPeers, NetMessage::Destroy { entity: id });
        }
    }

    fn spawn_info(&self, entity: &Entity, location: Vec3, velocity: Vec3) -> SpawnInfo {
        SpawnInfo {
            id: entity.id,
            kind: entity.kind,
            owning_peer: entity.owning_peer,
            owner: entity.owner,
            instigator: entity.instigator,
            location,
            velocity,
        }
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Register a remote peer and send it everything spawned so far, followed
    /// by the current value of every field it is entitled to.
    pub fn add_peer(&mut self, peer: PeerId) {
        if !self.is_authority() || peer.is_server() || self.peers.contains(&peer) {
            return;
        }
        self.peers.push(peer);

        // Owners before the entities that point at them
        let mut spawns: Vec<SpawnInfo> = Vec::new();
        spawns.extend(
            self.characters
                .values()
                .map(|c| self.spawn_info(&c.entity, c.location, Vec3::ZERO)),
        );
        spawns.extend(
            self.weapons
                .values()
                .map(|w| self.spawn_info(&w.entity, Vec3::ZERO, Vec3::ZERO)),
        );
        // Projectiles in flight are placed where they should be by now
        let now = self.clock.now();
        spawns.extend(
            self.projectiles
                .values()
                .map(|p| self.spawn_info(&p.entity, p.estimated_location(now), p.velocity)),
        );
        let entity_count = spawns.len();
        for info in spawns {
            self.channel.push(Route::Peer(peer), NetMessage::Spawn { info });
        }

        let snapshot = self.store.snapshot_for(peer);
        let field_count = snapshot.len();
        for update in snapshot {
            self.channel.push(Route::Peer(peer), NetMessage::Replicate { update });
        }

        info!(peer = %peer, entities = entity_count, fields = field_count, "Peer joined");
    }

    /// Drop a peer and every character it controlled
    pub fn remove_peer(&mut self, peer: PeerId) {
        if !self.is_authority() {
            return;
        }
        self.peers.retain(|p| *p != peer);
        self.channel.forget_peer(peer);

        let owned: Vec<EntityId> = self
            .characters
            .values()
            .filter(|c| c.entity.owning_peer == Some(peer))
            .map(Character::id)
            .collect();
        for character in owned {
            self.destroy_entity(character);
        }
        info!(peer = %peer, "Peer left");
    }

    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    // ------------------------------------------------------------------
    // Calls and messages
    // ------------------------------------------------------------------

    /// Issue a server call. Executes in place on the authority; otherwise
    /// queued for it. Only entities this host controls may be the subject.
    pub fn call_server(&mut self, call: ServerCall) {
        if !self.locally_controls(call.subject()) {
            debug!(call = call.name(), peer = %self.peer, "Server call for an entity this host does not control");
            return;
        }
        if self.is_authority() {
            let ctx = CallContext {
                sender: self.peer,
                received_at: self.clock.now(),
            };
            self.dispatch_server_call(&ctx, call);
        } else {
            self.channel.send_to_server(call);
        }
    }

    /// Publish an authority notification locally and to every peer
    pub fn multicast(&mut self, event: MulticastEvent) {
        if !self.is_authority() {
            debug!(peer = %self.peer, "Multicast from a non-authority host ignored");
            return;
        }
        self.publish(&event);
        self.channel.multicast(event);
    }

    fn publish(&mut self, event: &MulticastEvent) {
        match event {
            MulticastEvent::Fired(fired) => self.events.fired.broadcast(fired),
        }
    }

    /// Handle one message delivered from `from`
    pub fn receive(&mut self, from: PeerId, message: NetMessage) {
        match message {
            NetMessage::Call { sender, call } => self.handle_server_call(from, sender, call),
            _ if self.is_authority() => {
                debug!(from = %from, "Authority ignores replicated traffic");
            }
            NetMessage::Multicast { event } => self.publish(&event),
            NetMessage::Spawn { info } => self.handle_spawn(info),
            NetMessage::Destroy { entity } => {
                self.destroy_entity(entity);
            }
            NetMessage::Replicate { update } => {
                let entity = update.entity;
                if let Err(e) = self.store.apply_update(update) {
                    debug!(entity = %entity, error = %e, "Replicated update dropped");
                }
            }
        }
    }

    fn handle_server_call(&mut self, from: PeerId, sender: PeerId, call: ServerCall) {
        if !self.is_authority() {
            debug!(from = %from, call = call.name(), "Server call reached a non-authority host");
            return;
        }
        if sender != from {
            warn!(from = %from, claimed = %sender, call = call.name(), "Server call with a forged sender");
            self.channel.note_rejected();
            return;
        }
        if !self.channel.admit(from) {
            debug!(peer = %from, call = call.name(), "Server call over rate limit, dropping");
            return;
        }
        let ctx = CallContext {
            sender: from,
            received_at: self.clock.now(),
        };
        self.dispatch_server_call(&ctx, call);
    }

    fn dispatch_server_call(&mut self, ctx: &CallContext, call: ServerCall) -> CallOutcome {
        let outcome = match call {
            ServerCall::SetRemoteControlRotation { character, rotation } => {
                SET_REMOTE_CONTROL_ROTATION.dispatch(self, ctx, (character, rotation))
            }
            ServerCall::ServerStartAim { character } => {
                SERVER_SET_AIMING.dispatch(self, ctx, (character, true))
            }
            ServerCall::ServerStopAim { character } => {
                SERVER_SET_AIMING.dispatch(self, ctx, (character, false))
            }
            ServerCall::ServerFire { weapon, fired_at } => {
                SERVER_FIRE.dispatch(self, ctx, (weapon, fired_at))
            }
        };
        if outcome == CallOutcome::Rejected {
            self.channel.note_rejected();
        }
        outcome
    }

    fn handle_spawn(&mut self, info: SpawnInfo) {
        if self.store.contains(info.id) {
            trace!(entity = %info.id, "Duplicate spawn ignored");
            return;
        }
        if let Err(e) = self.insert_entity(&info) {
            warn!(entity = %info.id, error = %e, "Proxy spawn failed");
            return;
        }
        // Cosmetic flight on proxies; contacts only count on the authority
        if info.kind == EntityKind::Projectile {
            self.services.motion.launch(info.id, info.location, info.velocity);
        }
    }

    /// Queue every dirty replicated field for the peers entitled to it
    pub fn collect_replication(&mut self) {
        if !self.is_authority() {
            return;
        }
        for (peer, update) in self.store.drain_updates(&self.peers) {
            self.channel.push(Route::Peer(peer), NetMessage::Replicate { update });
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        self.channel.drain()
    }

    // ------------------------------------------------------------------
    // Ownership checks
    // ------------------------------------------------------------------

    /// Whether the call's sender is the peer controlling `character`
    pub(crate) fn caller_controls_character(&self, ctx: &CallContext, character: EntityId) -> bool {
        self.characters
            .get(&character)
            .is_some_and(|c| c.entity.owning_peer == Some(ctx.sender))
    }

    /// Whether this host drives `entity` (a character, or a weapon whose owner it drives)
    fn locally_controls(&self, entity: EntityId) -> bool {
        let character = match self.weapons.get(&entity) {
            Some(w) => w.owner(),
            None => Some(entity),
        };
        character
            .and_then(|id| self.characters.get(&id))
            .is_some_and(Character::is_locally_controlled)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn weapon_count(&self) -> usize {
        self.weapons.len()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn entity_count(&self) -> usize {
        self.store.entity_count()
    }

    pub fn calls_sent(&self) -> u64 {
        self.channel.calls_sent()
    }

    pub fn calls_rejected(&self) -> u64 {
        self.channel.calls_rejected()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    use crate::config::CALL_RATE_LIMIT;
    use crate::game::character::IS_AIMING;
    use crate::game::math::Rotator;
    use crate::game::world::RecordingMotion;
    use crate::replication::{FieldUpdate, FieldValue};

    pub(crate) fn server_host(services: Services) -> Host {
        server_host_with(Tuning::default(), services)
    }

    pub(crate) fn server_host_with(tuning: Tuning, services: Services) -> Host {
        Host::new(PeerId::SERVER, tuning, CALL_RATE_LIMIT, 7, services)
    }

    pub(crate) fn client_host(peer: PeerId, services: Services) -> Host {
        Host::new(peer, Tuning::default(), CALL_RATE_LIMIT, 7, services)
    }

    static NEXT_SEQ: AtomicU16 = AtomicU16::new(1);

    fn from_authority(entity: EntityId, field: &str, value: FieldValue) -> NetMessage {
        NetMessage::Replicate {
            update: FieldUpdate {
                entity,
                field: field.to_string(),
                seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
                value,
            },
        }
    }

    impl Host {
        /// Receive an armed character the authority spawned for `owning_peer`
        pub(crate) fn adopt_character(&mut self, owning_peer: Option<PeerId>) -> EntityId {
            let character = EntityId::new();
            let weapon = EntityId::new();
            self.receive(
                PeerId::SERVER,
                NetMessage::Spawn {
                    info: SpawnInfo {
                        id: character,
                        kind: EntityKind::Character,
                        owning_peer,
                        owner: None,
                        instigator: None,
                        location: Vec3::ZERO,
                        velocity: Vec3::ZERO,
                    },
                },
            );
            self.receive(
                PeerId::SERVER,
                NetMessage::Spawn {
                    info: SpawnInfo {
                        id: weapon,
                        kind: EntityKind::Weapon,
                        owning_peer,
                        owner: Some(character),
                        instigator: Some(character),
                        location: Vec3::ZERO,
                        velocity: Vec3::ZERO,
                    },
                },
            );
            self.receive(
                PeerId::SERVER,
                from_authority(character, CURRENT_WEAPON.name(), FieldValue::Entity(Some(weapon))),
            );
            character
        }

        pub(crate) fn replicate_aiming(&mut self, character: EntityId, aiming: bool) {
            self.receive(
                PeerId::SERVER,
                from_authority(character, IS_AIMING.name(), FieldValue::Bool(aiming)),
            );
        }
    }

    #[test]
    fn character_spawns_armed_and_announced() {
        let mut host = server_host(Services::open_sky());
        let me = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();

        assert_eq!(host.weapons[&weapon].owner(), Some(me));
        assert_eq!(host.store.read(weapon, MUZZLE_SOCKET_NAME).as_deref(), Some("muzzle"));
        let spawns = host
            .drain_outbox()
            .into_iter()
            .filter(|o| matches!(o.message, NetMessage::Spawn { .. }))
            .count();
        assert_eq!(spawns, 2);
    }

    #[test]
    fn unarmed_when_weapons_disabled() {
        let tuning = Tuning {
            weapon_enabled: false,
            ..Tuning::default()
        };
        let mut host = server_host_with(tuning, Services::open_sky());
        let me = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        assert_eq!(host.current_weapon(me), None);
        assert_eq!(host.weapon_count(), 0);
    }

    #[test]
    fn destroying_a_character_takes_its_weapon() {
        let mut host = server_host(Services::open_sky());
        let me = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();
        host.drain_outbox();

        assert!(host.destroy_entity(me));
        assert_eq!(host.weapon_count(), 0);
        assert_eq!(host.entity_count(), 0);

        let destroyed: Vec<EntityId> = host
            .drain_outbox()
            .into_iter()
            .filter_map(|o| match o.message {
                NetMessage::Destroy { entity } => Some(entity),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec![me, weapon]);
        assert!(!host.destroy_entity(me));
    }

    #[test]
    fn projectiles_expire_after_life_span() {
        let motion = RecordingMotion::default();
        let services = Services {
            motion: Box::new(motion.clone()),
            ..Services::open_sky()
        };
        let mut host = server_host(services);
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();
        let projectile = host.resolve_hit(weapon).unwrap();

        host.tick(1.5);
        assert_eq!(host.projectile_count(), 1);
        host.tick(0.5);
        assert_eq!(host.projectile_count(), 0);
        assert_eq!(motion.stopped.lock().as_slice(), &[projectile]);
    }

    #[test]
    fn late_peer_receives_spawns_then_snapshot() {
        let mut host = server_host(Services::open_sky());
        let me = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        host.add_peer(PeerId(1));
        host.set_calculated_spread(me, 2.0);
        host.drain_outbox();

        host.add_peer(PeerId(2));
        let out = host.drain_outbox();
        assert!(out.iter().all(|o| o.route == Route::Peer(PeerId(2))));
        let first_replicate = out
            .iter()
            .position(|o| matches!(o.message, NetMessage::Replicate { .. }))
            .unwrap();
        assert_eq!(first_replicate, 2);
        assert!(out[..2]
            .iter()
            .all(|o| matches!(o.message, NetMessage::Spawn { .. })));
        assert!(matches!(
            &out[0].message,
            NetMessage::Spawn { info } if info.kind == EntityKind::Character
        ));
    }

    #[test]
    fn late_peer_sees_projectile_where_it_has_flown() {
        let mut host = server_host(Services::open_sky());
        let shooter = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(shooter).unwrap();
        let projectile = host.resolve_hit(weapon).unwrap();
        let (launch, velocity) = {
            let p = host.projectile(projectile).unwrap();
            (p.location, p.velocity)
        };
        host.tick(0.5);
        host.drain_outbox();

        host.add_peer(PeerId(2));
        let info = host
            .drain_outbox()
            .into_iter()
            .find_map(|o| match o.message {
                NetMessage::Spawn { info } if info.id == projectile => Some(info),
                _ => None,
            })
            .unwrap();
        assert!((info.location - (launch + velocity * 0.5)).length() < 1e-2);
        assert_eq!(info.velocity, velocity);
    }

    #[test]
    fn replication_respects_conditions() {
        let mut host = server_host(Services::open_sky());
        host.add_peer(PeerId(1));
        host.add_peer(PeerId(2));
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let ctx = CallContext {
            sender: PeerId(1),
            received_at: 0.0,
        };
        SET_REMOTE_CONTROL_ROTATION.dispatch(&mut host, &ctx, (theirs, Rotator::new(0.0, 90.0, 0.0)));
        host.drain_outbox();

        host.collect_replication();
        let aim_receivers: Vec<Route> = host
            .drain_outbox()
            .into_iter()
            .filter(|o| matches!(&o.message, NetMessage::Replicate { update } if update.field == "target_aim_rotation"))
            .map(|o| o.route)
            .collect();
        assert_eq!(aim_receivers, vec![Route::Peer(PeerId(2))]);
    }

    #[test]
    fn forged_sender_is_rejected() {
        let mut host = server_host(Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        host.receive(
            PeerId(2),
            NetMessage::Call {
                sender: PeerId(1),
                call: ServerCall::ServerStartAim { character: theirs },
            },
        );
        assert!(!host.is_aiming(theirs));
        assert_eq!(host.calls_rejected(), 1);

        host.receive(
            PeerId(1),
            NetMessage::Call {
                sender: PeerId(1),
                call: ServerCall::ServerStartAim { character: theirs },
            },
        );
        assert!(host.is_aiming(theirs));
    }

    #[test]
    fn rate_limited_calls_are_dropped() {
        let mut host = Host::new(PeerId::SERVER, Tuning::default(), 1, 7, Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        host.receive(
            PeerId(1),
            NetMessage::Call {
                sender: PeerId(1),
                call: ServerCall::ServerStartAim { character: theirs },
            },
        );
        host.receive(
            PeerId(1),
            NetMessage::Call {
                sender: PeerId(1),
                call: ServerCall::ServerStopAim { character: theirs },
            },
        );
        // The stop call was over budget
        assert!(host.is_aiming(theirs));
        assert_eq!(host.calls_rejected(), 1);
    }

    #[test]
    fn removed_peer_loses_its_characters() {
        let mut host = server_host(Services::open_sky());
        host.add_peer(PeerId(1));
        host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let other = host.spawn_character(Some(PeerId(2)), Vec3::ZERO);

        host.remove_peer(PeerId(1));
        assert_eq!(host.character_count(), 1);
        assert!(host.character(other).is_some());
        assert!(host.peers().is_empty());
    }

    #[test]
    fn client_buffers_fields_until_spawn() {
        let mut client = client_host(PeerId(2), Services::open_sky());
        let character = EntityId::new();
        client.receive(
            PeerId::SERVER,
            from_authority(character, IS_AIMING.name(), FieldValue::Bool(true)),
        );
        assert!(!client.is_aiming(character));

        client.receive(
            PeerId::SERVER,
            NetMessage::Spawn {
                info: SpawnInfo {
                    id: character,
                    kind: EntityKind::Character,
                    owning_peer: Some(PeerId(1)),
                    owner: None,
                    instigator: None,
                    location: Vec3::ZERO,
                    velocity: Vec3::ZERO,
                },
            },
        );
        assert!(client.is_aiming(character));
        assert_eq!(
            client.character(character).map(|c| c.entity.role),
            Some(NetRole::SimulatedProxy)
        );
    }

    #[test]
    fn client_refuses_calls_for_entities_it_does_not_control() {
        let mut client = client_host(PeerId(2), Services::open_sky());
        let other = client.adopt_character(Some(PeerId(1)));
        client.call_server(ServerCall::ServerStartAim { character: other });
        assert!(client.drain_outbox().is_empty());
    }
}
