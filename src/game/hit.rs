//! Server-side hit resolution
//!
//! Traces from the firer's eyes, aims the shot from the muzzle at whatever
//! the trace found, applies spread and hands the projectile to the motion
//! service.

use tracing::{debug, warn};

use crate::net::MulticastEvent;
use crate::session::Host;

use super::entity::EntityId;
use super::events::FiredEvent;
use super::math::{random_unit_vector_in_cone, Vec3};
use super::weapon::PROJECTILE_DIRECTION;
use super::world::WorldTrace;

/// Point the shot aims at: the first blocking hit, or the far end of the trace
pub fn trace_target(
    world: &dyn WorldTrace,
    start: Vec3,
    direction: Vec3,
    range: f32,
    ignore: &[EntityId],
) -> Vec3 {
    let end = start + direction * range;
    world
        .trace(start, end, ignore)
        .map(|hit| hit.location)
        .unwrap_or(end)
}

/// Unit direction from the muzzle to the target. Falls back to the view
/// direction when the two points coincide.
pub fn firing_direction(muzzle: Vec3, target: Vec3, view_direction: Vec3) -> Vec3 {
    (target - muzzle)
        .normalized()
        .unwrap_or_else(|| view_direction.safe_normal())
}

impl Host {
    /// Resolve one shot of `weapon` and spawn its projectile.
    /// Returns the projectile id, or `None` when nothing was fired.
    pub(crate) fn resolve_hit(&mut self, weapon: EntityId) -> Option<EntityId> {
        if !self.is_authority() {
            debug!(weapon = %weapon, "Hit resolution skipped on a non-authority host");
            return None;
        }
        let w = self.weapons.get(&weapon)?;
        // Nothing configured to shoot
        let class = w.projectile.clone()?;
        let Some(character) = w.owner().and_then(|id| self.characters.get(&id)) else {
            warn!(weapon = %weapon, "Hit resolution aborted: weapon owner is gone");
            return None;
        };
        let character_id = character.id();

        let (eye, view) = character.eyes_view_point(self.tuning.eye_height);
        let view_direction = view.to_vector();
        let target = trace_target(
            self.services.trace.as_ref(),
            eye,
            view_direction,
            self.tuning.max_trace_range,
            &[character_id, weapon],
        );

        let muzzle = w.muzzle_location(character.location, view);
        let aimed = firing_direction(muzzle, target, view_direction);
        let spread = self.calculated_spread(character_id);
        let direction = random_unit_vector_in_cone(aimed, spread, &mut self.rng);

        if let Err(e) = self.store.write(weapon, PROJECTILE_DIRECTION, direction) {
            debug!(weapon = %weapon, error = %e, "Projectile direction not written");
        }

        let velocity = direction * class.initial_speed;
        let projectile = self.spawn_projectile(weapon, character_id, muzzle, velocity, class);
        self.services.motion.launch(projectile, muzzle, velocity);

        debug!(
            weapon = %weapon,
            projectile = %projectile,
            x = direction.x,
            y = direction.y,
            z = direction.z,
            "Shot resolved"
        );

        self.multicast(MulticastEvent::Fired(FiredEvent {
            character: character_id,
            weapon,
            projectile,
            direction,
        }));
        Some(projectile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::entity::PeerId;
    use crate::game::world::{OpenSky, RecordingMotion, Services, SphereTarget, TargetWorld};
    use crate::session::host::tests::server_host_with;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn no_hit_targets_the_far_end() {
        let target = trace_target(&OpenSky, Vec3::new(0.0, 0.0, 64.0), Vec3::X, 10_000.0, &[]);
        assert_eq!(target, Vec3::new(10_000.0, 0.0, 64.0));
    }

    #[test]
    fn coincident_target_falls_back_to_view() {
        let dir = firing_direction(Vec3::X, Vec3::X, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(dir, Vec3::Y);
    }

    /// Firer at the origin with the muzzle and eyes on it, looking down +X
    /// at a sphere whose near surface is at (100, 0, 0)
    fn point_blank(motion: RecordingMotion, projectile: bool) -> Host {
        let services = Services {
            trace: Box::new(TargetWorld::new(vec![SphereTarget {
                entity: None,
                center: Vec3::new(110.0, 0.0, 0.0),
                radius: 10.0,
                material: None,
            }])),
            motion: Box::new(motion),
            ..Services::open_sky()
        };
        let mut tuning = Tuning {
            eye_height: 0.0,
            muzzle_offset: Vec3::ZERO,
            ..Tuning::default()
        };
        if !projectile {
            tuning.projectile = None;
        }
        server_host_with(tuning, services)
    }

    #[test]
    fn zero_spread_fires_straight_at_the_target() {
        let motion = RecordingMotion::default();
        let mut host = point_blank(motion.clone(), true);
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();

        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        host.events.fired.subscribe(move |e: &FiredEvent| sink.lock().push(e.clone()));

        let projectile = host.resolve_hit(weapon).unwrap();

        let launches = motion.launches.lock();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].projectile, projectile);
        assert_eq!(launches[0].location, Vec3::ZERO);
        assert!((launches[0].velocity.safe_normal() - Vec3::X).length() < 1e-6);
        assert!((launches[0].velocity.length() - 1000.0).abs() < 1e-3);

        assert_eq!(host.store.read(weapon, PROJECTILE_DIRECTION), Some(Vec3::X));
        let events = fired.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].character, me);
        assert_eq!(events[0].projectile, projectile);
    }

    #[test]
    fn spread_stays_inside_the_cone() {
        let motion = RecordingMotion::default();
        let mut host = point_blank(motion.clone(), true);
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();
        host.set_calculated_spread(me, 5.0);

        for _ in 0..20 {
            host.resolve_hit(weapon);
        }
        let min_cos = 5.0f32.to_radians().cos() - 1e-4;
        for launch in motion.launches.lock().iter() {
            assert!(launch.velocity.safe_normal().dot(Vec3::X) >= min_cos);
        }
    }

    #[test]
    fn missing_projectile_class_is_a_silent_no_op() {
        let motion = RecordingMotion::default();
        let mut host = point_blank(motion.clone(), false);
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();

        assert_eq!(host.resolve_hit(weapon), None);
        assert!(motion.launches.lock().is_empty());
        assert_eq!(host.projectile_count(), 0);
        assert_eq!(host.store.read(weapon, PROJECTILE_DIRECTION), Some(Vec3::ZERO));
    }
}
