//! Weapon entity: replicated firing state and muzzle placement

use crate::config::Tuning;
use crate::replication::{EntitySchema, FieldKey, ReplicationCondition};

use super::entity::{Entity, EntityId, EntityKind};
use super::fire::FireLoop;
use super::math::{Rotator, Vec3};
use super::projectile::ProjectileClass;

/// Direction of the last shot, written once per fire by the authority
pub const PROJECTILE_DIRECTION: FieldKey<Vec3> = FieldKey::new("projectile_direction");
pub const HANDLE_SOCKET_NAME: FieldKey<String> = FieldKey::new("handle_socket_name");
pub const MUZZLE_SOCKET_NAME: FieldKey<String> = FieldKey::new("muzzle_socket_name");

pub fn weapon_schema() -> EntitySchema {
    let mut schema = EntitySchema::new(EntityKind::Weapon);
    schema
        .declare_field(PROJECTILE_DIRECTION, ReplicationCondition::Always)
        .declare_field(HANDLE_SOCKET_NAME, ReplicationCondition::Always)
        .declare_field(MUZZLE_SOCKET_NAME, ReplicationCondition::Always);
    schema
}

/// Host-local view of a weapon
#[derive(Debug, Clone)]
pub struct Weapon {
    pub entity: Entity,
    pub fire_loop: FireLoop,
    /// Muzzle position relative to the owner, in the owner's yaw frame
    pub muzzle_offset: Vec3,
    /// `None` means firing is a no-op
    pub projectile: Option<ProjectileClass>,
}

impl Weapon {
    pub fn new(entity: Entity, tuning: &Tuning) -> Self {
        Self {
            entity,
            fire_loop: FireLoop::new(tuning.time_between_shots),
            muzzle_offset: tuning.muzzle_offset,
            projectile: tuning.projectile.clone(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    /// Owning character (weak reference, may be gone)
    pub fn owner(&self) -> Option<EntityId> {
        self.entity.owner
    }

    pub fn muzzle_location(&self, owner_location: Vec3, owner_rotation: Rotator) -> Vec3 {
        owner_location + owner_rotation.rotate_yaw(self.muzzle_offset)
    }
}
