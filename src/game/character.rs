//! Player character: replicated aim/weapon state and movement input

use tracing::debug;

use crate::replication::{EntitySchema, FieldKey, ReplicationCondition};
use crate::session::Host;

use super::aim::AimMode;
use super::entity::{Entity, EntityId, EntityKind, PeerId};
use super::math::{Rotator, Vec3};

/// Weapon the character currently holds
pub const CURRENT_WEAPON: FieldKey<Option<EntityId>> = FieldKey::new("current_weapon");
pub const IS_AIMING: FieldKey<bool> = FieldKey::new("is_aiming");
/// Look rotation observers use for aim offsets; the controlling peer keeps its own copy
pub const TARGET_AIM_ROTATION: FieldKey<Rotator> = FieldKey::new("target_aim_rotation");
/// Spread cone half-angle in degrees, decided by the authority
pub const CALCULATED_SPREAD: FieldKey<f32> = FieldKey::new("calculated_spread");

pub fn character_schema() -> EntitySchema {
    let mut schema = EntitySchema::new(EntityKind::Character);
    schema
        .declare_field(CURRENT_WEAPON, ReplicationCondition::Always)
        .declare_field(IS_AIMING, ReplicationCondition::Always)
        .declare_field(TARGET_AIM_ROTATION, ReplicationCondition::SimulatedOnly)
        .declare_field(CALCULATED_SPREAD, ReplicationCondition::Always);
    schema
}

/// Host-local view of a character
#[derive(Debug, Clone)]
pub struct Character {
    pub entity: Entity,
    pub aim_mode: AimMode,
    /// Controller look rotation; only meaningful where the character is
    /// controlled or authority-driven
    pub control_rotation: Rotator,
    pub location: Vec3,
}

impl Character {
    pub fn new(entity: Entity, local: PeerId, location: Vec3) -> Self {
        let locally_controlled = entity.is_controlled_by(local);
        let aim_mode = AimMode::resolve(entity.role, locally_controlled);
        Self {
            entity,
            aim_mode,
            control_rotation: Rotator::default(),
            location,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    pub fn is_locally_controlled(&self) -> bool {
        matches!(
            self.aim_mode,
            AimMode::LocallyAuthoritative | AimMode::LocallyControlledRemote
        )
    }

    /// Eye location and view orientation used for hit-scan traces
    pub fn eyes_view_point(&self, eye_height: f32) -> (Vec3, Rotator) {
        (self.location + Vec3::Z * eye_height, self.control_rotation)
    }
}

/// Direction of a movement axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveAxis {
    Forward,
    Right,
}

impl Host {
    /// Forward/backward input, `value` in [-1, 1]
    pub fn move_forward(&mut self, character: EntityId, value: f32) {
        self.add_axis_movement(character, MoveAxis::Forward, value);
    }

    /// Side to side input, `value` in [-1, 1]
    pub fn move_right(&mut self, character: EntityId, value: f32) {
        self.add_axis_movement(character, MoveAxis::Right, value);
    }

    fn add_axis_movement(&mut self, character: EntityId, axis: MoveAxis, value: f32) {
        if value == 0.0 {
            return;
        }
        let Some(ch) = self.characters.get(&character) else {
            return;
        };
        if !ch.is_locally_controlled() {
            debug!(entity = %character, "Movement input for a character this host does not control");
            return;
        }

        // Only the heading matters, looking up or down never slows movement
        let yaw = ch.control_rotation.yaw_only();
        let direction = match axis {
            MoveAxis::Forward => yaw.to_vector(),
            MoveAxis::Right => yaw.right_vector(),
        };
        self.services
            .movement
            .add_movement_input(character, direction, value.clamp(-1.0, 1.0));
    }

    /// Position reported by the movement component
    pub fn set_character_location(&mut self, character: EntityId, location: Vec3) {
        if let Some(ch) = self.characters.get_mut(&character) {
            ch.location = location;
        }
    }

    /// Authority-side accuracy update, replicated to every peer
    pub fn set_calculated_spread(&mut self, character: EntityId, spread_degrees: f32) {
        let spread = if spread_degrees.is_finite() {
            spread_degrees.clamp(0.0, 180.0)
        } else {
            0.0
        };
        if let Err(e) = self.store.write(character, CALCULATED_SPREAD, spread) {
            debug!(entity = %character, error = %e, "Spread not updated");
        }
    }

    pub fn current_weapon(&self, character: EntityId) -> Option<EntityId> {
        self.store.read(character, CURRENT_WEAPON).flatten()
    }

    pub fn is_aiming(&self, character: EntityId) -> bool {
        self.store.read(character, IS_AIMING).unwrap_or(false)
    }

    pub fn target_aim_rotation(&self, character: EntityId) -> Option<Rotator> {
        self.store.read(character, TARGET_AIM_ROTATION)
    }

    pub fn calculated_spread(&self, character: EntityId) -> f32 {
        self.store.read(character, CALCULATED_SPREAD).unwrap_or(0.0)
    }
}
