// ── Webhook Handler (orchestrator) ──────────────────────────────────────
// Grounded on `src-tauri/src/engine/webhook.rs` (request/response shape
// conventions, adapted from raw TCP to axum extractors) and
// `original_source/webhook_server/app.py::webhook_receiver` (agent_id/prompt
// extraction precedence, the exact step ordering and per-step isolation).

use crate::agent_tracker;
use crate::error::GatewayError;
use crate::memory_blocks::MemoryBlockManager;
use crate::sources::{agent_registry, arxiv::ArxivSource, knowledge_graph::KnowledgeGraphSource, EnrichmentSource};
use crate::state::GatewayState;
use crate::tool_inventory;
use crate::tool_selector;
use crate::types::{metadata_map, NewBlockData};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

/// Extract `agent_id` by scanning a `request.path` value for the
/// `…/agents/<agent-…>/…` segment, returning only tokens that look like
/// platform agent IDs (`agent-` prefixed).
fn extract_agent_id_from_path(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split('/').collect();
    let idx = parts.iter().position(|p| *p == "agents")?;
    let candidate = parts.get(idx + 1)?;
    if candidate.starts_with("agent-") {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Flatten a `prompt` field that may be a bare string or a list of
/// `{type:"text", text:…}` items into plain text.
fn extract_prompt_text(prompt: Option<&Value>) -> Option<String> {
    match prompt? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let mut text = String::new();
            for item in items {
                if item.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(t) = item.get("text").and_then(Value::as_str) {
                        text.push_str(t);
                        text.push(' ');
                    }
                }
            }
            Some(text.trim().to_string())
        }
        _ => None,
    }
}

struct Extracted {
    event_type: String,
    agent_id: Option<String>,
    prompt: Option<String>,
}

fn extract(body: &Value) -> Extracted {
    let event_type = body.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    let mut agent_id = None;
    let mut prompt = None;

    match event_type.as_str() {
        "message_sent" => {
            prompt = extract_prompt_text(body.get("prompt"));
            agent_id = body
                .get("response")
                .and_then(|r| r.get("agent_id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if agent_id.is_none() {
                if let Some(path) = body.get("request").and_then(|r| r.get("path")).and_then(Value::as_str) {
                    agent_id = extract_agent_id_from_path(path);
                }
            }
        }
        "stream_started" => {
            prompt = extract_prompt_text(body.get("prompt"));
            if let Some(path) = body.get("request").and_then(|r| r.get("path")).and_then(Value::as_str) {
                agent_id = extract_agent_id_from_path(path);
            }
        }
        _ => {
            prompt = extract_prompt_text(body.get("prompt"));
            agent_id = body
                .get("response")
                .and_then(|r| r.get("agent_id"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }
    }

    Extracted { event_type, agent_id, prompt }
}

/// Run the knowledge-graph and (conditionally) arXiv searches concurrently,
/// combining their rendered blocks. Graphiti's block is always included,
/// even its failure message, since it still carries useful information;
/// arXiv is appended only when triggered and non-empty.
async fn enrich_context(
    graphiti: &KnowledgeGraphSource,
    arxiv: &ArxivSource,
    prompt: &str,
) -> String {
    let arxiv_triggered = arxiv.trigger(prompt).await;
    let (graphiti_outcome, arxiv_outcome) = tokio::join!(
        graphiti.fetch(prompt),
        async {
            if arxiv_triggered {
                Some(arxiv.fetch(prompt).await)
            } else {
                None
            }
        }
    );

    let mut combined = graphiti_outcome.context;
    if let Some(outcome) = arxiv_outcome {
        if !outcome.context.is_empty() {
            combined.push_str("\n\n");
            combined.push_str(&outcome.context);
        }
    }
    combined
}

pub async fn handle_webhook(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, GatewayError> {
    let extracted = extract(&body);

    if let Some(agent_id) = &extracted.agent_id {
        agent_tracker::track_agent_and_notify(state.clone(), agent_id);
    }

    let (Some(agent_id), Some(prompt)) = (extracted.agent_id.clone(), extracted.prompt.clone()) else {
        warn!("[webhook] missing agent_id or prompt, returning 400");
        return Err(GatewayError::Validation("Could not extract agent_id or prompt from webhook.".into()));
    };

    let client = state.client.clone();
    let config = state.config.clone();
    let mgr = MemoryBlockManager::new(&client, &config);

    // Step 2-3: enrichment context fan-out, written to graphiti_context.
    let graphiti = KnowledgeGraphSource::new(client.clone(), &config.graphiti_url, config.graphiti_max_nodes, config.graphiti_max_facts);
    let arxiv = ArxivSource::new(client.clone(), config.arxiv_enabled);
    let ctx = enrich_context(&graphiti, &arxiv, &prompt).await;

    let context_block = NewBlockData {
        label: "graphiti_context".into(),
        value: ctx,
        metadata: metadata_map(Some(&json!({ "source": "webhook", "event_type": extracted.event_type }))),
    };
    if let Err(e) = mgr.create_or_update(&context_block, Some(&agent_id)).await {
        warn!("[webhook] failed to write graphiti_context block for {agent_id}: {e}");
    }

    // Step 4: agent discovery.
    let registry_source = agent_registry::AgentRegistrySource::new(client.clone(), config.clone());
    let agent_ctx = registry_source.fetch(&prompt).await.context;
    let agent_metadata = metadata_map(Some(&json!({ "source": "agent_registry", "event_type": extracted.event_type })));
    let agent_write = if config.available_agents_cumulative {
        let block = NewBlockData { label: "available_agents".into(), value: agent_ctx, metadata: agent_metadata };
        mgr.create_or_update(&block, Some(&agent_id)).await
    } else {
        mgr.create_or_update_snapshot("available_agents", &agent_ctx, &agent_metadata, &agent_id).await
    };
    if let Err(e) = agent_write {
        warn!("[webhook] failed to write available_agents block for {agent_id}: {e}");
    }

    // Step 5: tool selection.
    let attach_result = tool_selector::attach_tools(&client, &config, &agent_id, &prompt).await;

    // Step 6: record attachments, render, and persist the tool inventory.
    if let Ok(attached) = &attach_result {
        for tool in &attached.details.successful_attachments {
            tool_inventory::record_attachment(&state, &agent_id, &prompt, &tool.name, &tool.tool_id, tool.match_score);
        }
    } else if let Err(e) = &attach_result {
        warn!("[webhook] tool attachment failed for {agent_id}: {e}");
    }

    let tools = tool_inventory::fetch_agent_tools(&client, &config, &agent_id).await;
    let snapshot = tool_inventory::render_snapshot(&state, &agent_id, &tools);
    if let Err(e) = mgr.create_tool_inventory(&agent_id, &snapshot).await {
        warn!("[webhook] failed to write tool inventory block for {agent_id}: {e}");
    }

    info!("[webhook] processed webhook for agent {agent_id}");
    Ok((StatusCode::OK, Json(json!({ "status": "success", "message": "Context processed and tools attached" }))))
}
