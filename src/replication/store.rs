//! Per-host replicated field store
//!
//! The authoritative host writes fields and drains them into per-peer
//! updates; every other host applies those updates. A non-authority host may
//! keep a predicted local value until replication overwrites it.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::game::entity::{EntityId, EntityKind, PeerId};

use super::field::{sequence_greater_than, FieldKey, FieldType, FieldUpdate, FieldValue};
use super::schema::EntitySchema;
use super::ReplicationError;

/// Result of applying an incoming update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Older than the value already held
    Stale,
    /// Entity not spawned here yet; kept until it is
    Buffered,
    /// Entity was already destroyed here
    Discarded,
}

/// Destroyed ids remembered so late updates for them are not buffered
const MAX_TOMBSTONES: usize = 1024;

#[derive(Debug, Clone)]
struct FieldSlot {
    value: FieldValue,
    seq: u16,
    written: bool,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct EntityFields {
    kind: EntityKind,
    owning_peer: Option<PeerId>,
    authority: bool,
    slots: Vec<FieldSlot>,
}

/// Replicated state of every entity known to one host
#[derive(Debug, Default)]
pub struct FieldStore {
    schemas: HashMap<EntityKind, EntitySchema>,
    entities: HashMap<EntityId, EntityFields>,
    /// Updates that arrived before their entity's spawn notification
    pending: HashMap<EntityId, Vec<FieldUpdate>>,
    tombstones: HashSet<EntityId>,
    tombstone_order: VecDeque<EntityId>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_schema(&mut self, schema: EntitySchema) {
        self.schemas.insert(schema.kind(), schema);
    }

    /// Start tracking an entity with its schema defaults
    pub fn insert_entity(
        &mut self,
        id: EntityId,
        kind: EntityKind,
        owning_peer: Option<PeerId>,
        authority: bool,
    ) -> Result<(), ReplicationError> {
        let schema = self
            .schemas
            .get(&kind)
            .ok_or(ReplicationError::UnknownKind(kind))?;

        let slots = schema
            .fields()
            .iter()
            .map(|d| FieldSlot {
                value: d.default.clone(),
                seq: 0,
                written: false,
                dirty: false,
            })
            .collect();

        self.entities.insert(
            id,
            EntityFields {
                kind,
                owning_peer,
                authority,
                slots,
            },
        );

        if let Some(buffered) = self.pending.remove(&id) {
            debug!(entity = %id, count = buffered.len(), "Applying buffered field updates");
            for update in buffered {
                self.apply_update(update)?;
            }
        }
        Ok(())
    }

    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        self.pending.remove(&id);
        self.bury(id);
        self.entities.remove(&id).is_some()
    }

    fn bury(&mut self, id: EntityId) {
        if !self.tombstones.insert(id) {
            return;
        }
        self.tombstone_order.push_back(id);
        if self.tombstone_order.len() > MAX_TOMBSTONES {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn has_authority(&self, id: EntityId) -> bool {
        self.entities.get(&id).map(|e| e.authority).unwrap_or(false)
    }

    /// Authority write. Returns whether the value changed; unchanged writes
    /// are not re-sent.
    pub fn write<T: FieldType>(
        &mut self,
        id: EntityId,
        key: FieldKey<T>,
        value: T,
    ) -> Result<bool, ReplicationError> {
        let (entity, index) = self.slot_index(id, key.name())?;
        if !entity.authority {
            return Err(ReplicationError::NotAuthority {
                entity: id,
                field: key.name().to_string(),
            });
        }

        let value = value.into_value();
        let slot = self.slot_mut(id, index)?;
        if slot.written && slot.value == value {
            return Ok(false);
        }
        slot.value = value;
        slot.seq = slot.seq.wrapping_add(1);
        slot.written = true;
        slot.dirty = true;
        Ok(true)
    }

    /// Local copy on a controlling, non-authority host. Replication still
    /// wins: the next accepted update overwrites it. On the authority this
    /// is an ordinary write.
    pub fn predict<T: FieldType>(
        &mut self,
        id: EntityId,
        key: FieldKey<T>,
        value: T,
    ) -> Result<(), ReplicationError> {
        let (entity, index) = self.slot_index(id, key.name())?;
        if entity.authority {
            return self.write(id, key, value).map(|_| ());
        }
        let slot = self.slot_mut(id, index)?;
        slot.value = value.into_value();
        Ok(())
    }

    /// Last known value on this host
    pub fn read<T: FieldType>(&self, id: EntityId, key: FieldKey<T>) -> Option<T> {
        let (entity, index) = self.slot_index(id, key.name()).ok()?;
        T::from_value(&entity.slots[index].value)
    }

    /// Collect every dirty field into per-peer updates, filtered by each
    /// field's condition, and clear the dirty marks.
    pub fn drain_updates(&mut self, peers: &[PeerId]) -> Vec<(PeerId, FieldUpdate)> {
        let mut out = Vec::new();
        for (id, entity) in self.entities.iter_mut() {
            if !entity.authority {
                continue;
            }
            let Some(schema) = self.schemas.get(&entity.kind) else {
                continue;
            };
            for (descriptor, slot) in schema.fields().iter().zip(entity.slots.iter_mut()) {
                if !slot.dirty {
                    continue;
                }
                slot.dirty = false;
                for peer in peers {
                    if descriptor.condition.admits(*peer, entity.owning_peer) {
                        out.push((
                            *peer,
                            FieldUpdate {
                                entity: *id,
                                field: descriptor.name.to_string(),
                                seq: slot.seq,
                                value: slot.value.clone(),
                            },
                        ));
                    }
                }
            }
        }
        out
    }

    /// Every written field a newly connected peer should receive
    pub fn snapshot_for(&self, peer: PeerId) -> Vec<FieldUpdate> {
        let mut out = Vec::new();
        for (id, entity) in self.entities.iter() {
            if !entity.authority {
                continue;
            }
            let Some(schema) = self.schemas.get(&entity.kind) else {
                continue;
            };
            for (descriptor, slot) in schema.fields().iter().zip(entity.slots.iter()) {
                if slot.written && descriptor.condition.admits(peer, entity.owning_peer) {
                    out.push(FieldUpdate {
                        entity: *id,
                        field: descriptor.name.to_string(),
                        seq: slot.seq,
                        value: slot.value.clone(),
                    });
                }
            }
        }
        out
    }

    /// Apply an update received from the authority
    pub fn apply_update(&mut self, update: FieldUpdate) -> Result<ApplyOutcome, ReplicationError> {
        let Some(entity) = self.entities.get_mut(&update.entity) else {
            if self.tombstones.contains(&update.entity) {
                trace!(entity = %update.entity, field = %update.field, "Update for a destroyed entity dropped");
                return Ok(ApplyOutcome::Discarded);
            }
            self.pending.entry(update.entity).or_default().push(update);
            return Ok(ApplyOutcome::Buffered);
        };
        if entity.authority {
            return Err(ReplicationError::UpdateOnAuthority {
                entity: update.entity,
                field: update.field,
            });
        }

        let schema = self
            .schemas
            .get(&entity.kind)
            .ok_or(ReplicationError::UnknownKind(entity.kind))?;
        let (index, descriptor) =
            schema
                .field(&update.field)
                .ok_or_else(|| ReplicationError::UndeclaredField {
                    kind: entity.kind,
                    field: update.field.clone(),
                })?;
        if std::mem::discriminant(&descriptor.default) != std::mem::discriminant(&update.value) {
            return Err(ReplicationError::TypeMismatch {
                field: update.field,
            });
        }

        let slot = &mut entity.slots[index];
        if slot.written && !sequence_greater_than(update.seq, slot.seq) {
            trace!(entity = %update.entity, field = %update.field, seq = update.seq, "Dropping stale update");
            return Ok(ApplyOutcome::Stale);
        }
        slot.value = update.value;
        slot.seq = update.seq;
        slot.written = true;
        Ok(ApplyOutcome::Applied)
    }

    /// Number of updates waiting for their entity to spawn
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn slot_index(&self, id: EntityId, name: &str) -> Result<(&EntityFields, usize), ReplicationError> {
        let entity = self
            .entities
            .get(&id)
            .ok_or(ReplicationError::UnknownEntity(id))?;
        let schema = self
            .schemas
            .get(&entity.kind)
            .ok_or(ReplicationError::UnknownKind(entity.kind))?;
        let (index, _) = schema
            .field(name)
            .ok_or_else(|| ReplicationError::UndeclaredField {
                kind: entity.kind,
                field: name.to_string(),
            })?;
        Ok((entity, index))
    }

    fn slot_mut(&mut self, id: EntityId, index: usize) -> Result<&mut FieldSlot, ReplicationError> {
        self.entities
            .get_mut(&id)
            .and_then(|e| e.slots.get_mut(index))
            .ok_or(ReplicationError::UnknownEntity(id))
    }
}
