//! Per-entity-kind schema tables of replicated field descriptors

use crate::game::entity::EntityKind;

use super::field::{FieldKey, FieldType, FieldValue, ReplicationCondition};

/// Declaration of one replicated field
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub condition: ReplicationCondition,
    pub owner_kind: EntityKind,
    pub default: FieldValue,
}

/// Ordered list of the fields an entity kind replicates
#[derive(Debug, Clone)]
pub struct EntitySchema {
    kind: EntityKind,
    fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Register a field for replication. Declaring the same name twice
    /// replaces the earlier condition.
    pub fn declare_field<T: FieldType>(
        &mut self,
        key: FieldKey<T>,
        condition: ReplicationCondition,
    ) -> &mut Self {
        let descriptor = FieldDescriptor {
            name: key.name(),
            condition,
            owner_kind: self.kind,
            default: T::default_value(),
        };
        match self.fields.iter_mut().find(|d| d.name == key.name()) {
            Some(existing) => *existing = descriptor,
            None => self.fields.push(descriptor),
        }
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Slot index and descriptor of a field
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields.iter().enumerate().find(|(_, d)| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: FieldKey<f32> = FieldKey::new("speed");
    const ARMED: FieldKey<bool> = FieldKey::new("armed");

    #[test]
    fn declare_keeps_order_and_replaces_duplicates() {
        let mut schema = EntitySchema::new(EntityKind::Weapon);
        schema
            .declare_field(SPEED, ReplicationCondition::Always)
            .declare_field(ARMED, ReplicationCondition::OwnerOnly)
            .declare_field(SPEED, ReplicationCondition::SimulatedOnly);

        assert_eq!(schema.fields().len(), 2);
        let (index, speed) = schema.field("speed").unwrap();
        assert_eq!(index, 0);
        assert_eq!(speed.condition, ReplicationCondition::SimulatedOnly);
        assert_eq!(speed.owner_kind, EntityKind::Weapon);
        assert_eq!(speed.default, FieldValue::Float(0.0));
        assert!(schema.field("missing").is_none());
    }
}
