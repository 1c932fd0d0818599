//! Liveness endpoint and banner.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Open WebSocket connections
    pub connections: usize,
    /// Of those, connections without a bearer token
    pub anonymous_connections: usize,
    /// Collections with live subscribers
    pub watched_collections: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(|| async { "roomsync document server" }))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.conn_manager.connection_count(),
        anonymous_connections: state.conn_manager.anonymous_count(),
        watched_collections: state.conn_manager.watched_collections(),
    })
}
