//! Time utilities for the host simulation

use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Default tick rate
pub const SIMULATION_TPS: u32 = 30;

/// Delta time of one simulation tick (in seconds)
pub fn tick_delta(tps: u32) -> f64 {
    1.0 / tps.max(1) as f64
}

/// Tolerance used when comparing scheduled times against the clock
pub const TIME_EPSILON: f64 = 1e-6;

/// Simulated per-host world clock, in seconds since the host started
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn advance(&mut self, dt: f64) {
        self.now += dt.max(0.0);
    }

    /// Jump straight to an absolute time; never moves backwards
    pub fn set(&mut self, now: f64) {
        if now > self.now {
            self.now = now;
        }
    }
}
