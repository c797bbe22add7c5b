//! Replicated field values, typed keys and propagation conditions

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::game::entity::{EntityId, PeerId};
use crate::game::math::{Rotator, Vec3};

/// Which peers receive updates of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationCondition {
    /// Every connected peer
    Always,
    /// Every peer except the one controlling the entity
    SimulatedOnly,
    /// Only the peer controlling the entity
    OwnerOnly,
}

impl ReplicationCondition {
    pub fn admits(self, receiver: PeerId, owning_peer: Option<PeerId>) -> bool {
        match self {
            ReplicationCondition::Always => true,
            ReplicationCondition::SimulatedOnly => owning_peer != Some(receiver),
            ReplicationCondition::OwnerOnly => owning_peer == Some(receiver),
        }
    }
}

/// Wire representation of a field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Float(f32),
    Vector(Vec3),
    Rotation(Rotator),
    Entity(Option<EntityId>),
    Name(String),
}

/// Rust types that can be stored in a replicated field
pub trait FieldType: Sized {
    fn into_value(self) -> FieldValue;
    fn from_value(value: &FieldValue) -> Option<Self>;
    fn default_value() -> FieldValue;
}

macro_rules! field_type {
    ($ty:ty, $variant:ident, $default:expr) => {
        impl FieldType for $ty {
            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }

            fn from_value(value: &FieldValue) -> Option<Self> {
                match value {
                    FieldValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn default_value() -> FieldValue {
                FieldValue::$variant($default)
            }
        }
    };
}

field_type!(bool, Bool, false);
field_type!(f32, Float, 0.0);
field_type!(Vec3, Vector, Vec3::ZERO);
field_type!(Rotator, Rotation, Rotator::default());
field_type!(Option<EntityId>, Entity, None);
field_type!(String, Name, String::new());

/// Typed handle naming a replicated field
pub struct FieldKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FieldKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for FieldKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldKey<T> {}

impl<T> std::fmt::Debug for FieldKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FieldKey").field(&self.name).finish()
    }
}

/// One field change travelling from the authority to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub entity: EntityId,
    pub field: String,
    /// Per-field write sequence, used to drop stale reordered updates
    pub seq: u16,
    pub value: FieldValue,
}

/// Returns whether or not a wrapping sequence is newer than another
/// sequence_greater_than(2,1) will return true
/// sequence_greater_than(1,1) will return false
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}
