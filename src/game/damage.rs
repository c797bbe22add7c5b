//! Damage dispatch on projectile contact

use tracing::{debug, trace};

use crate::session::Host;

use super::entity::{EntityId, PeerId};
use super::math::Vec3;

/// Surface information of a contact
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HitDetails {
    pub location: Vec3,
    pub normal: Vec3,
    pub material: Option<String>,
}

/// One point damage notification handed to the damage system
#[derive(Debug, Clone, PartialEq)]
pub struct PointDamage {
    pub target: EntityId,
    pub amount: f32,
    /// Direction the damage travelled (projectile velocity, normalized)
    pub direction: Vec3,
    pub hit: HitDetails,
    /// Peer controlling the instigating character, if it is still around
    pub instigator_controller: Option<PeerId>,
    pub causer: EntityId,
    pub damage_type: String,
}

impl Host {
    /// Contact reported by the motion service for `projectile`.
    ///
    /// `other` is the entity that was touched, `None` for static geometry.
    /// Touching itself is ignored; any other contact dispatches damage (when
    /// an entity was hit) and destroys the projectile. Returns whether the
    /// contact was consumed.
    pub fn on_projectile_contact(
        &mut self,
        projectile: EntityId,
        other: Option<EntityId>,
        hit: HitDetails,
    ) -> bool {
        if !self.is_authority() {
            trace!(projectile = %projectile, "Contact ignored on a non-authority host");
            return false;
        }
        if other == Some(projectile) {
            return false;
        }
        let Some(p) = self.projectiles.get(&projectile) else {
            debug!(projectile = %projectile, "Contact for an unknown projectile");
            return false;
        };

        if let Some(target) = other {
            let instigator_controller = p
                .entity
                .instigator
                .and_then(|id| self.characters.get(&id))
                .and_then(|c| c.entity.owning_peer);
            let damage = PointDamage {
                target,
                amount: p.class.base_damage,
                direction: p.velocity.safe_normal(),
                hit,
                instigator_controller,
                causer: projectile,
                damage_type: p.class.damage_type.clone(),
            };
            self.services.damage.apply_point_damage(&damage);
            self.events.damage_dispatched.broadcast(&damage);
        }

        self.destroy_entity(projectile);
        true
    }
}
