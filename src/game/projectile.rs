//! Projectile entity spawned by the authority at fire time

use crate::replication::{EntitySchema, FieldKey, ReplicationCondition};

use super::entity::{Entity, EntityId, EntityKind};
use super::math::Vec3;

/// Launch velocity, so late observers can place the projectile
pub const PROJECTILE_VELOCITY: FieldKey<Vec3> = FieldKey::new("velocity");

pub fn projectile_schema() -> EntitySchema {
    let mut schema = EntitySchema::new(EntityKind::Projectile);
    schema.declare_field(PROJECTILE_VELOCITY, ReplicationCondition::Always);
    schema
}

/// What a weapon spawns when it fires
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileClass {
    pub initial_speed: f32,
    /// Seconds before the projectile destroys itself
    pub life_span: f64,
    pub base_damage: f32,
    pub damage_type: String,
}

impl Default for ProjectileClass {
    fn default() -> Self {
        Self {
            initial_speed: 1000.0,
            life_span: 2.0,
            base_damage: 1.0,
            damage_type: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub entity: Entity,
    /// Launch point; the motion service owns the flight after that
    pub location: Vec3,
    pub velocity: Vec3,
    pub spawned_at: f64,
    pub class: ProjectileClass,
}

impl Projectile {
    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    /// Straight-line estimate of where the projectile is at `now`
    pub fn estimated_location(&self, now: f64) -> Vec3 {
        let elapsed = (now - self.spawned_at).max(0.0) as f32;
        self.location + self.velocity * elapsed
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.spawned_at + self.class.life_span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::NetRole;

    #[test]
    fn expires_after_life_span() {
        let projectile = Projectile {
            entity: Entity {
                id: EntityId::new(),
                kind: EntityKind::Projectile,
                role: NetRole::Authority,
                owning_peer: None,
                owner: None,
                instigator: None,
            },
            location: Vec3::ZERO,
            velocity: Vec3::X,
            spawned_at: 1.0,
            class: ProjectileClass::default(),
        };
        assert!(!projectile.is_expired(2.5));
        assert!(projectile.is_expired(3.0));
        assert_eq!(projectile.estimated_location(0.5), Vec3::ZERO);
        assert_eq!(projectile.estimated_location(3.0), Vec3::X * 2.0);
    }
}
