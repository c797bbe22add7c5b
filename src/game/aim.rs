//! Aim synchronization
//!
//! Keeps a character's look rotation in step across hosts. The controlling
//! host applies input immediately; the authority mirrors it into the
//! replicated `target_aim_rotation`, which only observers receive.

use tracing::debug;

use crate::net::{CallContext, CallDescriptor, ServerCall};
use crate::session::Host;

use super::character::{IS_AIMING, TARGET_AIM_ROTATION};
use super::entity::{EntityId, NetRole};
use super::math::Rotator;

/// How a host treats one character's aim. Fixed at spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AimMode {
    /// Authority that also controls the character (listen host player)
    LocallyAuthoritative,
    /// Remote peer controlling a character owned by the authority
    LocallyControlledRemote,
    /// Observer; aim only changes through replication
    SimulatedRemote,
    /// Authority of a character a remote peer controls; aim only changes
    /// through validated server calls
    RemotelyDriven,
}

impl AimMode {
    pub fn resolve(role: NetRole, locally_controlled: bool) -> Self {
        match (role, locally_controlled) {
            (NetRole::Authority, true) => AimMode::LocallyAuthoritative,
            (NetRole::Authority, false) => AimMode::RemotelyDriven,
            (NetRole::AutonomousProxy, _) => AimMode::LocallyControlledRemote,
            (NetRole::SimulatedProxy, _) => AimMode::SimulatedRemote,
        }
    }
}

/// Authority side of [`ServerCall::SetRemoteControlRotation`]
pub const SET_REMOTE_CONTROL_ROTATION: CallDescriptor<Host, (EntityId, Rotator)> = CallDescriptor {
    name: "set_remote_control_rotation",
    validate: validate_remote_rotation,
    execute: execute_remote_rotation,
};

/// Authority side of [`ServerCall::ServerStartAim`] / [`ServerCall::ServerStopAim`]
pub const SERVER_SET_AIMING: CallDescriptor<Host, (EntityId, bool)> = CallDescriptor {
    name: "server_set_aiming",
    validate: validate_set_aiming,
    execute: execute_set_aiming,
};

fn validate_remote_rotation(host: &Host, ctx: &CallContext, args: &(EntityId, Rotator)) -> bool {
    let (character, rotation) = args;
    rotation.is_finite() && host.caller_controls_character(ctx, *character)
}

fn execute_remote_rotation(host: &mut Host, _ctx: &CallContext, args: (EntityId, Rotator)) {
    let (character, rotation) = args;
    let rotation = rotation.normalized();
    if let Some(ch) = host.characters.get_mut(&character) {
        ch.control_rotation = rotation;
    }
    // Re-sending the same absolute rotation is a no-op write
    if let Err(e) = host.store.write(character, TARGET_AIM_ROTATION, rotation) {
        debug!(entity = %character, error = %e, "Aim rotation not written");
    }
}

fn validate_set_aiming(host: &Host, ctx: &CallContext, args: &(EntityId, bool)) -> bool {
    host.caller_controls_character(ctx, args.0)
}

fn execute_set_aiming(host: &mut Host, _ctx: &CallContext, args: (EntityId, bool)) {
    let (character, aiming) = args;
    if let Err(e) = host.store.write(character, IS_AIMING, aiming) {
        debug!(entity = %character, error = %e, "Aiming flag not written");
    }
}

impl Host {
    /// Absolute yaw delta (mouse style)
    pub fn turn(&mut self, character: EntityId, delta: f32) {
        self.apply_look_input(character, |rotation| rotation.add_yaw(delta));
    }

    /// Absolute pitch delta (mouse style)
    pub fn look_up(&mut self, character: EntityId, delta: f32) {
        self.apply_look_input(character, |rotation| rotation.add_pitch(delta));
    }

    /// Normalized turn rate (stick style); 1.0 means the full base turn rate
    pub fn turn_at_rate(&mut self, character: EntityId, rate: f32, delta_seconds: f32) {
        let delta = rate * self.tuning.base_turn_rate * delta_seconds;
        self.turn(character, delta);
    }

    /// Normalized look up/down rate (stick style)
    pub fn look_up_at_rate(&mut self, character: EntityId, rate: f32, delta_seconds: f32) {
        let delta = rate * self.tuning.base_look_up_rate * delta_seconds;
        self.look_up(character, delta);
    }

    pub fn start_aiming(&mut self, character: EntityId) {
        self.set_aiming(character, true);
    }

    pub fn stop_aiming(&mut self, character: EntityId) {
        self.set_aiming(character, false);
    }

    fn set_aiming(&mut self, character: EntityId, aiming: bool) {
        let Some(mode) = self.characters.get(&character).map(|c| c.aim_mode) else {
            return;
        };
        match mode {
            AimMode::LocallyAuthoritative | AimMode::RemotelyDriven => {
                if let Err(e) = self.store.write(character, IS_AIMING, aiming) {
                    debug!(entity = %character, error = %e, "Aiming flag not written");
                }
            }
            AimMode::LocallyControlledRemote => {
                let call = if aiming {
                    ServerCall::ServerStartAim { character }
                } else {
                    ServerCall::ServerStopAim { character }
                };
                self.call_server(call);
            }
            AimMode::SimulatedRemote => {
                debug!(entity = %character, "Aim toggle on an observed character ignored");
            }
        }
    }

    fn apply_look_input(&mut self, character: EntityId, apply: impl FnOnce(&mut Rotator)) {
        let Some(ch) = self.characters.get_mut(&character) else {
            return;
        };
        if !ch.is_locally_controlled() {
            debug!(entity = %character, "Look input for a character this host does not control");
            return;
        }
        apply(&mut ch.control_rotation);
        self.replicate_aim_offset(character);
    }

    /// Push the control rotation to wherever `target_aim_rotation` is owned
    fn replicate_aim_offset(&mut self, character: EntityId) {
        let Some(ch) = self.characters.get(&character) else {
            return;
        };
        let rotation = ch.control_rotation;
        match ch.aim_mode {
            AimMode::LocallyAuthoritative => {
                // Authority and control coincide: write directly, never self-call
                if let Err(e) = self.store.write(character, TARGET_AIM_ROTATION, rotation) {
                    debug!(entity = %character, error = %e, "Aim rotation not written");
                }
            }
            AimMode::LocallyControlledRemote => {
                if let Err(e) = self.store.predict(character, TARGET_AIM_ROTATION, rotation) {
                    debug!(entity = %character, error = %e, "Aim rotation not predicted");
                }
                self.call_server(ServerCall::SetRemoteControlRotation { character, rotation });
            }
            AimMode::SimulatedRemote | AimMode::RemotelyDriven => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::PeerId;
    use crate::game::math::Vec3;
    use crate::game::world::Services;
    use crate::session::host::tests::{client_host, server_host};

    #[test]
    fn mode_resolution_covers_every_role() {
        assert_eq!(AimMode::resolve(NetRole::Authority, true), AimMode::LocallyAuthoritative);
        assert_eq!(AimMode::resolve(NetRole::Authority, false), AimMode::RemotelyDriven);
        assert_eq!(AimMode::resolve(NetRole::AutonomousProxy, true), AimMode::LocallyControlledRemote);
        assert_eq!(AimMode::resolve(NetRole::SimulatedProxy, false), AimMode::SimulatedRemote);
    }

    #[test]
    fn listen_host_writes_aim_without_calling_itself() {
        let mut host = server_host(Services::open_sky());
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        host.drain_outbox();

        host.turn(me, 30.0);
        host.look_up(me, 10.0);

        assert_eq!(host.target_aim_rotation(me), Some(Rotator::new(10.0, 30.0, 0.0)));
        assert_eq!(host.channel.calls_sent(), 0);
        assert!(host.drain_outbox().is_empty());
    }

    #[test]
    fn rate_input_scales_by_base_rate() {
        let mut host = server_host(Services::open_sky());
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        host.turn_at_rate(me, 1.0, 0.5);
        host.look_up_at_rate(me, -1.0, 0.5);
        let rotation = host.target_aim_rotation(me).unwrap();
        assert!((rotation.yaw - 22.5).abs() < 1e-4);
        assert!((rotation.pitch + 22.5).abs() < 1e-4);
    }

    #[test]
    fn remote_rotation_from_non_owner_is_rejected() {
        let mut host = server_host(Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let ctx = CallContext {
            sender: PeerId(2),
            received_at: 0.0,
        };
        let before = host.target_aim_rotation(theirs);
        let outcome = SET_REMOTE_CONTROL_ROTATION.dispatch(
            &mut host,
            &ctx,
            (theirs, Rotator::new(0.0, 120.0, 0.0)),
        );
        assert_eq!(outcome, crate::net::CallOutcome::Rejected);
        assert_eq!(host.target_aim_rotation(theirs), before);
    }

    #[test]
    fn non_finite_rotation_is_rejected() {
        let mut host = server_host(Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let ctx = CallContext {
            sender: PeerId(1),
            received_at: 0.0,
        };
        let outcome = SET_REMOTE_CONTROL_ROTATION.dispatch(
            &mut host,
            &ctx,
            (theirs, Rotator::new(f32::NAN, 0.0, 0.0)),
        );
        assert_eq!(outcome, crate::net::CallOutcome::Rejected);
        assert_eq!(host.characters[&theirs].control_rotation, Rotator::default());
    }

    #[test]
    fn observer_look_input_is_ignored() {
        let mut client = client_host(PeerId(2), Services::open_sky());
        let other = client.adopt_character(Some(PeerId(1)));
        client.turn(other, 45.0);
        assert_eq!(client.characters[&other].control_rotation, Rotator::default());
        assert_eq!(client.channel.calls_sent(), 0);
    }

    #[test]
    fn controlling_client_predicts_and_calls() {
        let mut client = client_host(PeerId(1), Services::open_sky());
        let mine = client.adopt_character(Some(PeerId(1)));
        client.turn(mine, 45.0);

        assert_eq!(client.target_aim_rotation(mine), Some(Rotator::new(0.0, 45.0, 0.0)));
        let out = client.drain_outbox();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0].message,
            crate::net::NetMessage::Call {
                call: ServerCall::SetRemoteControlRotation { rotation, .. },
                ..
            } if rotation.yaw == 45.0
        ));
    }

    #[test]
    fn client_aim_toggle_becomes_server_call() {
        let mut client = client_host(PeerId(1), Services::open_sky());
        let mine = client.adopt_character(Some(PeerId(1)));
        client.start_aiming(mine);
        client.stop_aiming(mine);

        // The flag only changes once the authority replicates it back
        assert!(!client.is_aiming(mine));
        let calls: Vec<&'static str> = client
            .drain_outbox()
            .iter()
            .filter_map(|o| match &o.message {
                crate::net::NetMessage::Call { call, .. } => Some(call.name()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["server_start_aim", "server_stop_aim"]);
    }
}
