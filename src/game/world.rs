//! External collaborators the action loop consumes
//!
//! Geometry queries, projectile motion, damage application and movement are
//! owned by other systems; the core only talks to them through these traits.

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::damage::PointDamage;
use super::entity::EntityId;
use super::math::Vec3;

/// First blocking intersection of a trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceHit {
    pub location: Vec3,
    pub entity: Option<EntityId>,
    pub material: Option<String>,
}

/// World geometry queries
pub trait WorldTrace: Send {
    fn trace(&self, start: Vec3, end: Vec3, ignore: &[EntityId]) -> Option<TraceHit>;
}

/// Projectile motion; owns flight and reports contacts back to the host
pub trait MotionService: Send {
    fn launch(&mut self, projectile: EntityId, location: Vec3, velocity: Vec3);
    fn stop(&mut self, projectile: EntityId);
}

/// Receiver of point damage notifications
pub trait DamageSystem: Send {
    fn apply_point_damage(&mut self, damage: &PointDamage);
}

/// Character movement component
pub trait MovementSink: Send {
    fn add_movement_input(&mut self, character: EntityId, direction: Vec3, scale: f32);
}

/// Collaborators one host talks to
pub struct Services {
    pub trace: Box<dyn WorldTrace>,
    pub motion: Box<dyn MotionService>,
    pub damage: Box<dyn DamageSystem>,
    pub movement: Box<dyn MovementSink>,
}

impl Services {
    /// Empty sky; motion, damage and movement are only logged
    pub fn open_sky() -> Self {
        Self {
            trace: Box::new(OpenSky),
            motion: Box::new(LogMotion),
            damage: Box::new(LogDamage),
            movement: Box::new(LogMovement),
        }
    }
}

/// A world with nothing to hit
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSky;

impl WorldTrace for OpenSky {
    fn trace(&self, _start: Vec3, _end: Vec3, _ignore: &[EntityId]) -> Option<TraceHit> {
        None
    }
}

/// Sphere target for [`TargetWorld`]
#[derive(Debug, Clone, PartialEq)]
pub struct SphereTarget {
    pub entity: Option<EntityId>,
    pub center: Vec3,
    pub radius: f32,
    pub material: Option<String>,
}

/// A world made of spheres, enough for demos and tests
#[derive(Debug, Clone, Default)]
pub struct TargetWorld {
    pub targets: Vec<SphereTarget>,
}

impl TargetWorld {
    pub fn new(targets: Vec<SphereTarget>) -> Self {
        Self { targets }
    }
}

impl WorldTrace for TargetWorld {
    fn trace(&self, start: Vec3, end: Vec3, ignore: &[EntityId]) -> Option<TraceHit> {
        let segment = end - start;
        let length = segment.length();
        let dir = segment.normalized()?;

        let mut best: Option<(f32, &SphereTarget)> = None;
        for target in &self.targets {
            if target.entity.is_some_and(|e| ignore.contains(&e)) {
                continue;
            }
            // Ray-sphere intersection, nearest root in [0, length]
            let oc = start - target.center;
            let b = oc.dot(dir);
            let c = oc.dot(oc) - target.radius * target.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let sqrt_disc = disc.sqrt();
            let t = if -b - sqrt_disc >= 0.0 { -b - sqrt_disc } else { -b + sqrt_disc };
            if t < 0.0 || t > length {
                continue;
            }
            if best.map_or(true, |(best_t, _)| t < best_t) {
                best = Some((t, target));
            }
        }

        best.map(|(t, target)| TraceHit {
            location: start + dir * t,
            entity: target.entity,
            material: target.material.clone(),
        })
    }
}

/// Motion service that hands flight to nobody and logs it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMotion;

impl MotionService for LogMotion {
    fn launch(&mut self, projectile: EntityId, location: Vec3, velocity: Vec3) {
        debug!(projectile = %projectile, ?location, ?velocity, "Projectile launched");
    }

    fn stop(&mut self, projectile: EntityId) {
        trace!(projectile = %projectile, "Projectile stopped");
    }
}

/// Damage system that writes every hit to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDamage;

impl DamageSystem for LogDamage {
    fn apply_point_damage(&mut self, damage: &PointDamage) {
        info!(
            target_entity = %damage.target,
            amount = damage.amount,
            causer = %damage.causer,
            damage_type = %damage.damage_type,
            "Point damage applied"
        );
    }
}

/// Movement sink with no movement component behind it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMovement;

impl MovementSink for LogMovement {
    fn add_movement_input(&mut self, character: EntityId, direction: Vec3, scale: f32) {
        trace!(entity = %character, ?direction, scale, "Movement input");
    }
}

/// Launch record kept by [`RecordingMotion`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub projectile: EntityId,
    pub location: Vec3,
    pub velocity: Vec3,
}

/// Motion service that only remembers launches
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingMotion {
    pub launches: Arc<Mutex<Vec<Launch>>>,
    pub stopped: Arc<Mutex<Vec<EntityId>>>,
}

#[cfg(test)]
impl MotionService for RecordingMotion {
    fn launch(&mut self, projectile: EntityId, location: Vec3, velocity: Vec3) {
        self.launches.lock().push(Launch {
            projectile,
            location,
            velocity,
        });
    }

    fn stop(&mut self, projectile: EntityId) {
        self.stopped.lock().push(projectile);
    }
}

/// Damage system that keeps every notification for inspection
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingDamage {
    pub received: Arc<Mutex<Vec<PointDamage>>>,
}

#[cfg(test)]
impl DamageSystem for RecordingDamage {
    fn apply_point_damage(&mut self, damage: &PointDamage) {
        self.received.lock().push(damage.clone());
    }
}

/// Movement sink that keeps every input for inspection
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingMovement {
    pub inputs: Arc<Mutex<Vec<(EntityId, Vec3, f32)>>>,
}

#[cfg(test)]
impl MovementSink for RecordingMovement {
    fn add_movement_input(&mut self, character: EntityId, direction: Vec3, scale: f32) {
        self.inputs.lock().push((character, direction, scale));
    }
}
