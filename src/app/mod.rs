//! Application wiring: shared state and the demo session loop

pub mod demo;
pub mod state;

pub use demo::DemoDriver;
pub use state::AppState;
