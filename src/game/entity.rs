//! Network identities and per-host roles

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a participating host. The authority is always `PeerId::SERVER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const SERVER: PeerId = PeerId(0);

    pub fn is_server(self) -> bool {
        self == Self::SERVER
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Network identity of a replicated entity, identical on every host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0.to_string();
        f.write_str(&id[..8])
    }
}

/// Entity types that take part in replication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Weapon,
    Projectile,
}

/// What a host may do with an entity. Fixed when the entity is spawned on that host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetRole {
    /// Source of truth; the only host allowed to write replicated fields
    Authority,
    /// Controlled by this host but owned by a remote authority
    AutonomousProxy,
    /// Observed only; state arrives through replication
    SimulatedProxy,
}

/// Replication metadata every entity carries
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub role: NetRole,
    /// Peer whose input drives this entity, if any
    pub owning_peer: Option<PeerId>,
    /// Weak back-reference to the owning entity (weapon -> character)
    pub owner: Option<EntityId>,
    pub instigator: Option<EntityId>,
}

impl Entity {
    pub fn has_authority(&self) -> bool {
        self.role == NetRole::Authority
    }

    /// Whether `local` is the peer controlling this entity
    pub fn is_controlled_by(&self, local: PeerId) -> bool {
        self.owning_peer == Some(local)
    }
}

/// Role a host assigns to an entity it learns about
pub fn role_for(local: PeerId, owning_peer: Option<PeerId>) -> NetRole {
    if local.is_server() {
        NetRole::Authority
    } else if owning_peer == Some(local) {
        NetRole::AutonomousProxy
    } else {
        NetRole::SimulatedProxy
    }
}
