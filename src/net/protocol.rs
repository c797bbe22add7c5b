//! Wire message definitions
//! These are the types exchanged between hosts

use serde::{Deserialize, Serialize};

use crate::game::entity::{EntityId, EntityKind, PeerId};
use crate::game::events::FiredEvent;
use crate::game::math::{Rotator, Vec3};
use crate::replication::FieldUpdate;

/// Calls a peer asks the authority to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ServerCall {
    /// Push the controlling peer's absolute look rotation
    SetRemoteControlRotation {
        character: EntityId,
        rotation: Rotator,
    },
    ServerStartAim {
        character: EntityId,
    },
    ServerStopAim {
        character: EntityId,
    },
    /// Fire the weapon once; the authority traces and spawns.
    /// `fired_at` is the sender's clock when its fire loop ran.
    ServerFire {
        weapon: EntityId,
        fired_at: f64,
    },
}

impl ServerCall {
    pub fn name(&self) -> &'static str {
        match self {
            ServerCall::SetRemoteControlRotation { .. } => "set_remote_control_rotation",
            ServerCall::ServerStartAim { .. } => "server_start_aim",
            ServerCall::ServerStopAim { .. } => "server_stop_aim",
            ServerCall::ServerFire { .. } => "server_fire",
        }
    }

    /// Entity the calling host must control to issue this call
    pub fn subject(&self) -> EntityId {
        match self {
            ServerCall::SetRemoteControlRotation { character, .. }
            | ServerCall::ServerStartAim { character }
            | ServerCall::ServerStopAim { character } => *character,
            ServerCall::ServerFire { weapon, .. } => *weapon,
        }
    }
}

/// Authority-originated notifications; never mutate state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MulticastEvent {
    Fired(FiredEvent),
}

/// Everything a host needs to create its proxy of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnInfo {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owning_peer: Option<PeerId>,
    pub owner: Option<EntityId>,
    pub instigator: Option<EntityId>,
    pub location: Vec3,
    pub velocity: Vec3,
}

/// Delivery lane of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Reliable, ordered per sender
    Reliable,
    /// Eventually consistent, may reorder
    Unreliable,
}

/// Envelope for everything that crosses a link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetMessage {
    Call { sender: PeerId, call: ServerCall },
    Multicast { event: MulticastEvent },
    Spawn { info: SpawnInfo },
    Destroy { entity: EntityId },
    Replicate { update: FieldUpdate },
}

impl NetMessage {
    pub fn lane(&self) -> Lane {
        match self {
            NetMessage::Replicate { .. } => Lane::Unreliable,
            _ => Lane::Reliable,
        }
    }
}
