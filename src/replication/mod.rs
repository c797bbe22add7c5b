//! Field-level replication: schemas, conditions and the per-host field store

pub mod field;
pub mod schema;
pub mod store;

pub use field::{FieldKey, FieldUpdate, FieldValue, ReplicationCondition};
pub use schema::EntitySchema;
pub use store::FieldStore;

use crate::game::entity::{EntityId, EntityKind};

/// Errors raised by the field store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplicationError {
    #[error("entity {0} is not registered with the field store")]
    UnknownEntity(EntityId),

    #[error("no schema registered for {0:?}")]
    UnknownKind(EntityKind),

    #[error("field `{field}` is not declared for {kind:?}")]
    UndeclaredField { kind: EntityKind, field: String },

    #[error("field `{field}` expects a different value type")]
    TypeMismatch { field: String },

    #[error("field `{field}` on entity {entity} can only be written by its authority")]
    NotAuthority { entity: EntityId, field: String },

    #[error("replicated update for `{field}` on entity {entity} reached its authority")]
    UpdateOnAuthority { entity: EntityId, field: String },
}
