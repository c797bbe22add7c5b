//! Scripted demo session driven by the binary
//!
//! Every participant is a bot that sweeps its aim and fires in bursts. The
//! authority's world is a set of spheres around the spawned characters, and
//! a small ballistic integrator reports projectile contacts back to it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::Config;
use crate::game::damage::HitDetails;
use crate::game::entity::{EntityId, PeerId};
use crate::game::events::FiredEvent;
use crate::game::math::Vec3;
use crate::game::world::{Services, SphereTarget, TargetWorld, WorldTrace};
use crate::session::{Session, SessionStats};
use crate::util::time::tick_delta;

/// Radius of the sphere standing in for a character
const CHARACTER_RADIUS: f32 = 40.0;
/// Seconds between two session summaries in the log
const SUMMARY_INTERVAL_SECS: u64 = 5;

/// A projectile contact waiting for its flight time to pass
#[derive(Debug, Clone)]
struct PendingContact {
    due: f64,
    projectile: EntityId,
    other: Option<EntityId>,
    hit: HitDetails,
}

pub struct DemoDriver {
    session: Session,
    world: TargetWorld,
    fired: Arc<Mutex<Vec<FiredEvent>>>,
    contacts: Vec<PendingContact>,
    tps: u32,
    ticks: u64,
}

impl DemoDriver {
    pub fn new(config: &Config) -> Self {
        let mut session = Session::new(
            config.tuning.clone(),
            config.net.clone(),
            config.session_seed,
            Box::new(|_: PeerId| Services::open_sky()),
        );
        session.spawn_host_player();
        for _ in 0..config.demo_peers {
            session.connect_peer();
        }

        let mut participants = vec![PeerId::SERVER];
        participants.extend(session.peers());
        let targets = participants
            .iter()
            .filter_map(|peer| session.character_of(*peer))
            .filter_map(|id| session.server().character(id))
            .map(|c| SphereTarget {
                entity: Some(c.id()),
                center: c.location + Vec3::Z * config.tuning.eye_height,
                radius: CHARACTER_RADIUS,
                material: Some("flesh".to_string()),
            })
            .collect();
        let world = TargetWorld::new(targets);
        session.server_mut().services.trace = Box::new(world.clone());

        Self::from_session(session, world, config.simulation_tps)
    }

    fn from_session(mut session: Session, world: TargetWorld, tps: u32) -> Self {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        session
            .server_mut()
            .events
            .fired
            .subscribe(move |event: &FiredEvent| sink.lock().push(event.clone()));

        Self {
            session,
            world,
            fired,
            contacts: Vec::new(),
            tps: tps.max(1),
            ticks: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// One scripted tick
    pub fn step(&mut self) {
        self.run_script();
        self.advance();
    }

    fn advance(&mut self) {
        self.session.tick(tick_delta(self.tps));
        self.ticks += 1;
        self.track_new_shots();
        self.deliver_contacts();
    }

    /// Each bot sweeps its aim and fires a two second burst every four
    /// seconds, phase shifted by one second per participant.
    fn run_script(&mut self) {
        let tps = u64::from(self.tps);
        let dt = tick_delta(self.tps) as f32;
        let mut participants = vec![PeerId::SERVER];
        participants.extend(self.session.peers());

        for (index, peer) in participants.into_iter().enumerate() {
            let Some(character) = self.session.character_of(peer) else {
                continue;
            };
            let Some(host) = self.session.host_mut(peer) else {
                continue;
            };
            host.turn_at_rate(character, 0.25, dt);

            let phase = (self.ticks + index as u64 * tps) % (tps * 4);
            if phase == 0 {
                host.start_aiming(character);
            } else if phase == tps / 2 {
                host.start_fire(character);
            } else if phase == tps * 2 {
                host.end_fire(character);
            } else if phase == tps * 2 + tps / 2 {
                host.stop_aiming(character);
            }
        }
    }

    /// Trace the flight of every projectile fired since the last tick
    fn track_new_shots(&mut self) {
        let fired: Vec<FiredEvent> = std::mem::take(&mut *self.fired.lock());
        let now = self.session.time();

        for event in fired {
            let Some(projectile) = self.session.server().projectile(event.projectile) else {
                continue;
            };
            let speed = projectile.class.initial_speed;
            if speed <= 0.0 {
                continue;
            }
            let start = projectile.location;
            let range = speed * projectile.class.life_span as f32;
            let end = start + event.direction * range;

            if let Some(hit) = self
                .world
                .trace(start, end, &[event.character, event.weapon])
            {
                let flight = (hit.location - start).length() / speed;
                self.contacts.push(PendingContact {
                    due: now + f64::from(flight),
                    projectile: event.projectile,
                    other: hit.entity,
                    hit: HitDetails {
                        location: hit.location,
                        normal: -event.direction,
                        material: hit.material,
                    },
                });
            }
        }
    }

    fn deliver_contacts(&mut self) {
        let now = self.session.time();
        let (due, waiting): (Vec<PendingContact>, Vec<PendingContact>) =
            std::mem::take(&mut self.contacts)
                .into_iter()
                .partition(|c| c.due <= now);
        self.contacts = waiting;

        for contact in due {
            let consumed = self.session.server_mut().on_projectile_contact(
                contact.projectile,
                contact.other,
                contact.hit,
            );
            if !consumed {
                debug!(projectile = %contact.projectile, "Contact arrived after the projectile was gone");
            }
        }
    }
}

/// Drive the demo session in real time, publishing counters for the HTTP layer
pub async fn run(mut driver: DemoDriver, stats: Arc<RwLock<SessionStats>>) {
    info!(
        peers = driver.session().peers().len(),
        tps = driver.tps,
        "Demo session started"
    );

    let tick_duration = Duration::from_micros(1_000_000 / u64::from(driver.tps));
    let mut tick_interval = interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let summary_every = u64::from(driver.tps) * SUMMARY_INTERVAL_SECS;

    loop {
        tick_interval.tick().await;

        driver.step();
        *stats.write() = driver.stats();

        if driver.ticks % summary_every == 0 {
            driver.session().log_summary();
        }
    }
}
