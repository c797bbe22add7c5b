//! Application state shared across routes

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::session::SessionStats;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Latest counters published by the session loop
    pub stats: Arc<RwLock<SessionStats>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(RwLock::new(SessionStats::default())),
        }
    }
}
