//! HTTP API for the agent.

pub mod routes;
pub mod types;

pub use routes::{resolve_turn, router, serve, AppState};
