// ── External Interface (§2, §6) ──────────────────────────────────────────
// Grounded on `src-tauri/src/engine/webhook.rs`'s route table shape,
// translated from raw-TCP dispatch to an axum `Router`, and on the original
// `webhook_server/app.py`'s `/health`, `/agent-tracker/status`,
// `/agent-tracker/reset` endpoints.

use crate::state::GatewayState;
use crate::webhook::handle_webhook;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/webhook/letta", post(handle_webhook))
        .route("/health", get(health))
        .route("/agent-tracker/status", get(agent_tracker_status))
        .route("/agent-tracker/reset", post(agent_tracker_reset))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "webhook-server",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn agent_tracker_status(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    let known_agents = state.known_agents();
    Json(json!({
        "known_agents": known_agents,
        "agent_count": known_agents.len(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into()
}

async fn agent_tracker_reset(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    let cleared = state.reset_known_agents();
    Json(json!({
        "status": "reset",
        "cleared_count": cleared,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
