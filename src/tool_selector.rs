// ── Tool Selector Client ─────────────────────────────────────────────────
// Grounded on `original_source/tool_manager.py::find_attach_tools` (payload
// shape, `*`-wildcard expansion via a live tools fetch, response parsing).

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::tool_inventory;
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const ATTACH_LIMIT: u32 = 3;
const ATTACH_MIN_SCORE: f64 = 70.0;

#[derive(Debug, Clone, Deserialize)]
pub struct AttachedTool {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub match_score: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachDetails {
    #[serde(default)]
    pub successful_attachments: Vec<AttachedTool>,
    #[serde(default)]
    pub detached_tools: Vec<Value>,
    #[serde(default)]
    pub preserved_tools: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub details: AttachDetails,
}

/// Expand the `"*"` convention in `keep_tools`: fetch the agent's currently
/// attached tool IDs and union them in (dedup, order-preserving), dropping
/// the literal `"*"` marker. Any additional explicit IDs already present are
/// kept as hard requirements.
async fn expand_keep_tools(
    client: &reqwest::Client,
    config: &GatewayConfig,
    agent_id: &str,
    keep_tools: &[String],
) -> Vec<String> {
    if !keep_tools.iter().any(|t| t == "*") {
        return keep_tools.to_vec();
    }

    let current = tool_inventory::fetch_agent_tools(client, config, agent_id).await;
    let current_ids: Vec<String> = current
        .iter()
        .filter_map(|t| t.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();

    let mut expanded: Vec<String> = keep_tools.iter().filter(|t| *t != "*").cloned().collect();
    expanded.extend(current_ids);

    let mut seen = std::collections::HashSet::new();
    expanded.retain(|id| seen.insert(id.clone()));
    expanded
}

/// Locate a currently-attached tool named `find_tools`, if any, to carry as
/// an explicit hard-required ID alongside the `"*"` wildcard.
async fn find_tools_id(client: &reqwest::Client, config: &GatewayConfig, agent_id: &str) -> Option<String> {
    let tools = tool_inventory::fetch_agent_tools(client, config, agent_id).await;
    tools.iter().find_map(|t| {
        if t.get("name").and_then(Value::as_str) == Some("find_tools") {
            t.get("id").and_then(Value::as_str).map(str::to_string)
        } else {
            None
        }
    })
}

/// Call the tool-selector's attach RPC for `query`/`agent_id`, preserving
/// everything currently attached (`"*"`) plus the `find_tools` tool ID when
/// present.
pub async fn attach_tools(
    client: &reqwest::Client,
    config: &GatewayConfig,
    agent_id: &str,
    query: &str,
) -> GatewayResult<AttachResponse> {
    let mut keep_tools = vec!["*".to_string()];
    if let Some(id) = find_tools_id(client, config, agent_id).await {
        keep_tools.push(id);
    }
    let keep_tools = expand_keep_tools(client, config, agent_id, &keep_tools).await;

    let payload = json!({
        "query": query,
        "agent_id": agent_id,
        "keep_tools": keep_tools,
        "limit": ATTACH_LIMIT,
        "min_score": ATTACH_MIN_SCORE,
        "return_structured": true,
    });

    let url = format!("{}/attach", config.tool_selector_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(15))
        .json(&payload)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(GatewayError::downstream("tool-selector", format!("status {}", resp.status())));
    }

    resp.json::<AttachResponse>().await.map_err(|e| {
        warn!("[tool-selector] malformed attach response: {e}");
        GatewayError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn expand_keep_tools_unions_current_attached_tools() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agents/agent-1/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "tool-a", "name": "a"},
                {"id": "tool-b", "name": "b"},
            ])))
            .mount(&server)
            .await;
        let mut config = GatewayConfig::default();
        config.letta_base_url = server.uri();
        let client = reqwest::Client::new();

        let expanded = expand_keep_tools(&client, &config, "agent-1", &["*".to_string(), "tool-b".to_string()]).await;
        assert!(expanded.contains(&"tool-a".to_string()));
        assert!(expanded.contains(&"tool-b".to_string()));
        assert!(!expanded.contains(&"*".to_string()));
        assert_eq!(expanded.iter().filter(|t| *t == "tool-b").count(), 1);
    }

    #[tokio::test]
    async fn expand_keep_tools_no_wildcard_is_passthrough() {
        let config = GatewayConfig::default();
        let client = reqwest::Client::new();
        let expanded = expand_keep_tools(&client, &config, "agent-1", &["tool-x".to_string()]).await;
        assert_eq!(expanded, vec!["tool-x".to_string()]);
    }

    #[tokio::test]
    async fn attach_tools_parses_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agents/agent-1/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/attach"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "details": {
                    "successful_attachments": [{"name": "web_search", "tool_id": "tool-9", "match_score": 88.0}],
                    "detached_tools": [],
                    "preserved_tools": [],
                }
            })))
            .mount(&server)
            .await;
        let mut config = GatewayConfig::default();
        config.letta_base_url = server.uri();
        config.tool_selector_url = server.uri();
        let client = reqwest::Client::new();

        let resp = attach_tools(&client, &config, "agent-1", "find me a tool").await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.details.successful_attachments.len(), 1);
        assert_eq!(resp.details.successful_attachments[0].name, "web_search");
    }
}
