// ── Agent Tracker ────────────────────────────────────────────────────────
// Grounded on `original_source/webhook_server/app.py::track_agent_and_notify`
// (lock-guarded check-and-insert strictly before dispatch, serial
// notify-then-register background task) and the atomics/Mutex-guarded
// shared-state idiom of `src-tauri/src/engine/state.rs`.

use crate::sources::agent_registry;
use crate::state::GatewayState;
use chrono::Utc;
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// If `agent_id` is new this process lifetime, atomically mark it known and
/// fire a best-effort background task: Matrix notify, then registry
/// registration. Both steps are fire-and-forget; nothing here affects the
/// caller's response.
pub fn track_agent_and_notify(state: Arc<GatewayState>, agent_id: &str) {
    if !agent_id.starts_with("agent-") {
        return;
    }

    if !state.mark_known(agent_id) {
        info!("[agent-tracker] known agent: {agent_id}");
        return;
    }

    info!("[agent-tracker] new agent detected: {agent_id}");
    let agent_id = agent_id.to_string();
    tokio::spawn(async move {
        notify_matrix(&state, &agent_id).await;
        register_with_registry(&state, &agent_id).await;
    });
}

async fn notify_matrix(state: &GatewayState, agent_id: &str) {
    let url = format!("{}/webhook/new-agent", state.config.matrix_client_url.trim_end_matches('/'));
    let payload = json!({ "agent_id": agent_id, "timestamp": Utc::now().to_rfc3339() });
    let result = state
        .client
        .post(&url)
        .timeout(Duration::from_secs(5))
        .json(&payload)
        .send()
        .await;
    match result {
        Ok(resp) if resp.status().is_success() => {
            info!("[agent-tracker] notified matrix client about new agent {agent_id}");
        }
        Ok(resp) => {
            warn!("[agent-tracker] matrix notify for {agent_id} returned {}", resp.status());
        }
        Err(e) => {
            warn!("[agent-tracker] matrix notify for {agent_id} failed: {e}");
        }
    }
}

async fn register_with_registry(state: &GatewayState, agent_id: &str) {
    let details = match agent_registry::get_agent_details(&state.client, &state.config, agent_id).await {
        Some(details) => details,
        None => {
            warn!("[agent-tracker] cannot register {agent_id}: failed to fetch details");
            return;
        }
    };

    let ok = agent_registry::register_agent(&state.client, &state.config, agent_id, &details).await;
    if ok {
        info!("[agent-tracker] successfully registered agent {agent_id}");
    } else {
        warn!("[agent-tracker] failed to register agent {agent_id}");
    }
}
