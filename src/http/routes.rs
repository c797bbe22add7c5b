//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::session::SessionStats;
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    simulation_tps: u32,
    session_time_secs: f64,
    peers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats.read();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        simulation_tps: state.config.simulation_tps,
        session_time_secs: stats.time_secs,
        peers: stats.peers,
    })
}

// ============================================================================
// Session counters
// ============================================================================

async fn stats_handler(State(state): State<AppState>) -> Json<SessionStats> {
    Json(state.stats.read().clone())
}
