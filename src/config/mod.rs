//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use tracing::warn;

use crate::game::math::Vec3;
use crate::game::projectile::ProjectileClass;
use crate::util::time::SIMULATION_TPS;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Diagnostics server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Simulation ticks per second
    pub simulation_tps: u32,
    /// Seed for the authority's spread RNG and link jitter
    pub session_seed: u64,
    /// Number of scripted remote peers the demo session connects
    pub demo_peers: u32,

    pub tuning: Tuning,
    pub net: NetConfig,
}

/// Gameplay tunables shared by every host in a session
#[derive(Clone, Debug)]
pub struct Tuning {
    /// Seconds between two shots of the fire loop
    pub time_between_shots: f64,
    /// Length of the hit-scan trace from the eye point
    pub max_trace_range: f32,
    /// Base turn rate in degrees per second (rate-style look input)
    pub base_turn_rate: f32,
    /// Base look up/down rate in degrees per second
    pub base_look_up_rate: f32,
    /// Eye point offset above the character location
    pub eye_height: f32,
    /// Muzzle offset relative to the character, in the character's yaw frame
    pub muzzle_offset: Vec3,
    /// Socket names the weapon replicates for attachment
    pub handle_socket_name: String,
    pub muzzle_socket_name: String,
    /// Whether characters spawn with a weapon
    pub weapon_enabled: bool,
    /// Projectile class the weapon spawns; `None` leaves firing a no-op
    pub projectile: Option<ProjectileClass>,
    /// Clock slack the authority grants when re-validating remote fire calls
    pub fire_validation_slack: f64,
    /// How far a remote fire stamp may trail the authority clock
    pub fire_max_lag: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            time_between_shots: 0.2,
            max_trace_range: 10_000.0,
            base_turn_rate: 45.0,
            base_look_up_rate: 45.0,
            eye_height: 64.0,
            muzzle_offset: Vec3::new(50.0, 20.0, 40.0),
            handle_socket_name: "hand_r_weapon".to_string(),
            muzzle_socket_name: "muzzle".to_string(),
            weapon_enabled: true,
            projectile: Some(ProjectileClass::default()),
            fire_validation_slack: 0.001,
            fire_max_lag: 1.0,
        }
    }
}

/// Simulated network link settings
#[derive(Clone, Debug)]
pub struct NetConfig {
    /// One-way latency applied to every message
    pub latency_ms: u64,
    /// Extra random delay on the unreliable (replication) lane
    pub jitter_ms: u64,
    /// Server calls accepted per peer per second
    pub call_rate_limit: u32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            jitter_ms: 0,
            call_rate_limit: CALL_RATE_LIMIT,
        }
    }
}

/// Default server call budget per peer (look input alone sends up to two calls per tick)
pub const CALL_RATE_LIMIT: u32 = 240;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = Tuning::default();
        let projectile_enabled: bool = parse_or("PROJECTILE_ENABLED", true)?;
        let projectile = if projectile_enabled {
            let class = ProjectileClass::default();
            Some(ProjectileClass {
                initial_speed: parse_or("PROJECTILE_SPEED", class.initial_speed)?,
                life_span: parse_or("PROJECTILE_LIFETIME", class.life_span)?,
                base_damage: parse_or("BASE_DAMAGE", class.base_damage)?,
                damage_type: env::var("DAMAGE_TYPE").unwrap_or(class.damage_type),
            })
        } else {
            None
        };

        let tuning = Tuning {
            time_between_shots: parse_or("TIME_BETWEEN_SHOTS", defaults.time_between_shots)?,
            max_trace_range: parse_or("MAX_TRACE_RANGE", defaults.max_trace_range)?,
            base_turn_rate: parse_or("BASE_TURN_RATE", defaults.base_turn_rate)?,
            base_look_up_rate: parse_or("BASE_LOOK_UP_RATE", defaults.base_look_up_rate)?,
            eye_height: parse_or("EYE_HEIGHT", defaults.eye_height)?,
            weapon_enabled: parse_or("WEAPON_ENABLED", defaults.weapon_enabled)?,
            fire_validation_slack: parse_or("FIRE_VALIDATION_SLACK", defaults.fire_validation_slack)?,
            fire_max_lag: parse_or("FIRE_MAX_LAG", defaults.fire_max_lag)?,
            projectile,
            ..defaults
        };

        let net_defaults = NetConfig::default();
        let net = NetConfig {
            latency_ms: parse_or("NET_LATENCY_MS", net_defaults.latency_ms)?,
            jitter_ms: parse_or("NET_JITTER_MS", net_defaults.jitter_ms)?,
            call_rate_limit: parse_or("CALL_RATE_LIMIT", net_defaults.call_rate_limit)?,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            simulation_tps: parse_or("SIMULATION_TPS", SIMULATION_TPS)?,
            session_seed: parse_or("SESSION_SEED", 0x5eed_u64)?,
            demo_peers: parse_or("DEMO_PEERS", 2)?,
            tuning,
            net,
        })
    }

    /// Surface configuration problems at startup instead of at fire time
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation_tps == 0 {
            return Err(ConfigError::OutOfRange("SIMULATION_TPS"));
        }
        if self.tuning.time_between_shots <= 0.0 {
            return Err(ConfigError::OutOfRange("TIME_BETWEEN_SHOTS"));
        }
        if self.tuning.max_trace_range <= 0.0 {
            return Err(ConfigError::OutOfRange("MAX_TRACE_RANGE"));
        }
        if self.tuning.fire_max_lag < 0.0 {
            return Err(ConfigError::OutOfRange("FIRE_MAX_LAG"));
        }
        if self.net.call_rate_limit == 0 {
            return Err(ConfigError::OutOfRange("CALL_RATE_LIMIT"));
        }
        if self.tuning.weapon_enabled && self.tuning.projectile.is_none() {
            warn!("No projectile class configured, weapons will not fire");
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Value out of range for environment variable: {0}")]
    OutOfRange(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
