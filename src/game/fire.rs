//! Fire-control loop
//!
//! Turns a press/release trigger into a repeating fire callback that never
//! runs faster than the weapon's `time_between_shots`, even across rapid
//! stop/start cycles.

use tracing::{debug, warn};

use crate::net::{CallContext, CallDescriptor, ServerCall};
use crate::session::Host;
use crate::util::time::TIME_EPSILON;

use super::character::Character;
use super::entity::EntityId;

/// Cancellable repeating callback schedule
#[derive(Debug, Clone, Default)]
pub struct RepeatingTask {
    next_due: Option<f64>,
    period: f64,
}

impl RepeatingTask {
    pub fn schedule(&mut self, now: f64, first_delay: f64, period: f64) {
        self.next_due = Some(now + first_delay.max(0.0));
        self.period = period;
    }

    /// Cancelling an idle task is a no-op
    pub fn cancel(&mut self) -> bool {
        self.next_due.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<f64> {
        self.next_due
    }

    /// At most one run per poll; the following run is a full period after
    /// this one actually ran.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.next_due {
            Some(due) if now + TIME_EPSILON >= due => {
                self.next_due = Some(now + self.period);
                true
            }
            _ => false,
        }
    }
}

/// Fire timing state of one weapon
#[derive(Debug, Clone)]
pub struct FireLoop {
    time_between_shots: f64,
    last_fire_time: Option<f64>,
    task: RepeatingTask,
}

impl FireLoop {
    pub fn new(time_between_shots: f64) -> Self {
        Self {
            time_between_shots,
            last_fire_time: None,
            task: RepeatingTask::default(),
        }
    }

    /// Begin the repeating callback. Returns false if it was already running.
    pub fn start(&mut self, now: f64) -> bool {
        if self.task.is_active() {
            return false;
        }
        let first_delay = self.first_delay(now);
        self.task.schedule(now, first_delay, self.time_between_shots);
        true
    }

    pub fn stop(&mut self) -> bool {
        self.task.cancel()
    }

    /// Delay that keeps the next shot a full interval after the last one
    pub fn first_delay(&self, now: f64) -> f64 {
        self.last_fire_time
            .map(|last| (last + self.time_between_shots - now).max(0.0))
            .unwrap_or(0.0)
    }

    pub fn poll(&mut self, now: f64) -> bool {
        self.task.poll(now)
    }

    pub fn record_fire(&mut self, now: f64) {
        self.last_fire_time = Some(now);
    }

    /// Whether a shot at `now` respects the interval, allowing `slack` seconds
    pub fn interval_elapsed(&self, now: f64, slack: f64) -> bool {
        self.last_fire_time
            .map(|last| now - last + slack + TIME_EPSILON >= self.time_between_shots)
            .unwrap_or(true)
    }

    pub fn is_firing(&self) -> bool {
        self.task.is_active()
    }

    pub fn next_due(&self) -> Option<f64> {
        self.task.next_due()
    }

    pub fn last_fire_time(&self) -> Option<f64> {
        self.last_fire_time
    }

    pub fn time_between_shots(&self) -> f64 {
        self.time_between_shots
    }
}

/// Authority side of [`ServerCall::ServerFire`]
///
/// Spacing is checked between the sender's fire stamps. A stamp must lie
/// within `[received_at - fire_max_lag, received_at + slack]`.
pub const SERVER_FIRE: CallDescriptor<Host, (EntityId, f64)> = CallDescriptor {
    name: "server_fire",
    validate: validate_server_fire,
    execute: execute_server_fire,
};

fn validate_server_fire(host: &Host, ctx: &CallContext, args: &(EntityId, f64)) -> bool {
    let (weapon, fired_at) = *args;
    let Some(w) = host.weapons.get(&weapon) else {
        return false;
    };
    let Some(owner) = w.owner() else {
        return false;
    };
    let slack = host.tuning.fire_validation_slack;
    if !fired_at.is_finite()
        || fired_at > ctx.received_at + slack
        || fired_at < ctx.received_at - host.tuning.fire_max_lag
    {
        debug!(weapon = %weapon, fired_at, received_at = ctx.received_at, "Fire stamp outside the accepted window");
        return false;
    }
    host.caller_controls_character(ctx, owner) && w.fire_loop.interval_elapsed(fired_at, slack)
}

fn execute_server_fire(host: &mut Host, _ctx: &CallContext, args: (EntityId, f64)) {
    let (weapon, fired_at) = args;
    if let Some(w) = host.weapons.get_mut(&weapon) {
        w.fire_loop.record_fire(fired_at);
    }
    host.resolve_hit(weapon);
}

impl Host {
    /// Fire pressed. Only starts when the character holds a weapon and aims.
    pub fn start_fire(&mut self, character: EntityId) {
        let controlled = self
            .characters
            .get(&character)
            .is_some_and(Character::is_locally_controlled);
        if !controlled {
            debug!(entity = %character, "Fire input for a character this host does not control");
            return;
        }
        let Some(weapon) = self.current_weapon(character) else {
            return;
        };
        if !self.is_aiming(character) {
            return;
        }
        let now = self.clock.now();
        if let Some(w) = self.weapons.get_mut(&weapon) {
            if !w.fire_loop.start(now) {
                debug!(weapon = %weapon, "Fire loop already running");
            }
        }
    }

    /// Fire released
    pub fn end_fire(&mut self, character: EntityId) {
        let Some(weapon) = self.current_weapon(character) else {
            return;
        };
        if let Some(w) = self.weapons.get_mut(&weapon) {
            w.fire_loop.stop();
        }
    }

    /// Run every fire loop that is due at the current time
    pub(crate) fn run_fire_loops(&mut self) {
        let now = self.clock.now();
        let mut due: Vec<EntityId> = self
            .weapons
            .values_mut()
            .filter_map(|w| w.fire_loop.poll(now).then_some(w.id()))
            .collect();
        due.sort_by_key(|id| id.0);
        for weapon in due {
            self.fire_once(weapon);
        }
    }

    /// Body of the repeating fire callback
    pub fn fire_once(&mut self, weapon: EntityId) {
        let now = self.clock.now();
        let Some(w) = self.weapons.get(&weapon) else {
            return;
        };
        let owner_valid = w
            .owner()
            .is_some_and(|owner| self.characters.contains_key(&owner));
        if !owner_valid {
            warn!(weapon = %weapon, "fire_once: weapon has no owner");
            return;
        }

        if let Some(w) = self.weapons.get_mut(&weapon) {
            w.fire_loop.record_fire(now);
        }

        if self.is_authority() {
            self.resolve_hit(weapon);
        } else {
            self.call_server(ServerCall::ServerFire {
                weapon,
                fired_at: now,
            });
        }
    }

    pub fn is_firing(&self, weapon: EntityId) -> bool {
        self.weapons
            .get(&weapon)
            .map(|w| w.fire_loop.is_firing())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::PeerId;
    use crate::game::math::Vec3;
    use crate::game::world::{RecordingMotion, Services};
    use crate::session::host::tests::{client_host, server_host};

    #[test]
    fn first_delay_suppresses_catch_up() {
        let mut fire = FireLoop::new(0.2);
        fire.record_fire(0.0);
        assert!(fire.start(0.05));
        let due = fire.next_due().unwrap();
        assert!(due >= 0.2 - 1e-9, "first callback scheduled at {due}");
        assert!(!fire.poll(0.1));
        assert!(fire.poll(0.2));
    }

    #[test]
    fn first_shot_is_immediate_without_history() {
        let mut fire = FireLoop::new(0.2);
        fire.start(3.0);
        assert_eq!(fire.next_due(), Some(3.0));
    }

    #[test]
    fn start_then_stop_never_fires() {
        let mut fire = FireLoop::new(0.2);
        fire.record_fire(1.0);
        fire.start(1.05);
        assert!(fire.stop());
        assert!(!fire.poll(5.0));
        assert!(!fire.stop());
    }

    #[test]
    fn double_start_keeps_one_schedule() {
        let mut fire = FireLoop::new(0.2);
        assert!(fire.start(0.0));
        assert!(fire.poll(0.0));
        assert!(!fire.start(0.01));
        assert_eq!(fire.next_due(), Some(0.2));
    }

    #[test]
    fn poll_fires_at_most_once_and_respects_period() {
        let mut fire = FireLoop::new(0.2);
        fire.start(0.0);
        let mut shots = Vec::new();
        let mut now = 0.0;
        while now < 1.0 {
            if fire.poll(now) {
                fire.record_fire(now);
                shots.push(now);
            }
            now += 0.05;
        }
        assert_eq!(shots.len(), 5);
        for pair in shots.windows(2) {
            assert!(pair[1] - pair[0] >= 0.2 - 1e-6);
        }
    }

    #[test]
    fn start_fire_requires_aiming() {
        let mut host = server_host(Services::open_sky());
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();

        host.start_fire(me);
        assert!(!host.is_firing(weapon));

        host.start_aiming(me);
        host.start_fire(me);
        assert!(host.is_firing(weapon));

        host.end_fire(me);
        host.end_fire(me);
        assert!(!host.is_firing(weapon));
    }

    #[test]
    fn listen_host_fire_loop_spawns_at_fixed_rate() {
        let motion = RecordingMotion::default();
        let services = Services {
            motion: Box::new(motion.clone()),
            ..Services::open_sky()
        };
        let mut host = server_host(services);
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        host.start_aiming(me);
        host.start_fire(me);

        for _ in 0..30 {
            host.tick(1.0 / 30.0);
        }
        host.end_fire(me);
        for _ in 0..30 {
            host.tick(1.0 / 30.0);
        }
        // One shot every 0.2 s over the first second
        assert_eq!(motion.launches.lock().len(), 5);
    }

    #[test]
    fn orphaned_weapon_does_nothing() {
        let motion = RecordingMotion::default();
        let services = Services {
            motion: Box::new(motion.clone()),
            ..Services::open_sky()
        };
        let mut host = server_host(services);
        let me = host.spawn_character(Some(PeerId::SERVER), Vec3::ZERO);
        let weapon = host.current_weapon(me).unwrap();

        host.characters.remove(&me);
        host.fire_once(weapon);

        assert!(motion.launches.lock().is_empty());
        assert_eq!(host.weapons[&weapon].fire_loop.last_fire_time(), None);
    }

    #[test]
    fn client_fire_becomes_server_call() {
        let mut client = client_host(PeerId(1), Services::open_sky());
        let mine = client.adopt_character(Some(PeerId(1)));
        client.replicate_aiming(mine, true);
        let weapon = client.current_weapon(mine).unwrap();

        client.start_fire(mine);
        client.tick(0.0);

        let out = client.drain_outbox();
        assert!(out.iter().any(|o| matches!(
            &o.message,
            crate::net::NetMessage::Call { call: ServerCall::ServerFire { weapon: w, .. }, .. } if *w == weapon
        )));
        assert_eq!(client.projectile_count(), 0);
    }

    #[test]
    fn server_fire_too_soon_is_rejected() {
        let motion = RecordingMotion::default();
        let services = Services {
            motion: Box::new(motion.clone()),
            ..Services::open_sky()
        };
        let mut host = server_host(services);
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(theirs).unwrap();
        let ctx = |t: f64| CallContext {
            sender: PeerId(1),
            received_at: t,
        };

        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx(1.0), (weapon, 1.0)), crate::net::CallOutcome::Executed);
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx(1.1), (weapon, 1.1)), crate::net::CallOutcome::Rejected);
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx(1.2), (weapon, 1.2)), crate::net::CallOutcome::Executed);
        assert_eq!(motion.launches.lock().len(), 2);
        assert_eq!(host.weapons[&weapon].fire_loop.last_fire_time(), Some(1.2));
    }

    #[test]
    fn server_fire_from_other_peer_is_rejected() {
        let mut host = server_host(Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(theirs).unwrap();
        let ctx = CallContext {
            sender: PeerId(2),
            received_at: 0.0,
        };
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx, (weapon, 0.0)), crate::net::CallOutcome::Rejected);
        assert_eq!(host.projectile_count(), 0);
        assert_eq!(host.weapons[&weapon].fire_loop.last_fire_time(), None);
    }

    #[test]
    fn server_fire_spacing_uses_the_sender_stamp() {
        let mut host = server_host(Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(theirs).unwrap();
        let ctx = |t: f64| CallContext {
            sender: PeerId(1),
            received_at: t,
        };

        // Fired 0.2 s apart, delivered one 30 Hz tick closer together
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx(1.1), (weapon, 1.0)), crate::net::CallOutcome::Executed);
        assert_eq!(
            SERVER_FIRE.dispatch(&mut host, &ctx(1.1 + 0.2 - 1.0 / 30.0), (weapon, 1.2)),
            crate::net::CallOutcome::Executed
        );
        assert_eq!(host.weapons[&weapon].fire_loop.last_fire_time(), Some(1.2));
    }

    #[test]
    fn server_fire_stamp_outside_window_is_rejected() {
        let mut host = server_host(Services::open_sky());
        let theirs = host.spawn_character(Some(PeerId(1)), Vec3::ZERO);
        let weapon = host.current_weapon(theirs).unwrap();
        let ctx = CallContext {
            sender: PeerId(1),
            received_at: 5.0,
        };

        // From the future
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx, (weapon, 5.5)), crate::net::CallOutcome::Rejected);
        // Banked from long ago
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx, (weapon, 3.0)), crate::net::CallOutcome::Rejected);
        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx, (weapon, f64::NAN)), crate::net::CallOutcome::Rejected);
        assert_eq!(host.projectile_count(), 0);

        assert_eq!(SERVER_FIRE.dispatch(&mut host, &ctx, (weapon, 4.9)), crate::net::CallOutcome::Executed);
    }
}
