// ── Agent Registry ───────────────────────────────────────────────────────
// Grounded on `original_source/webhook_server/agent_registry.py` (read in
// full): exact search/register payload shapes and the minimal
// `format_agent_context` render. Doubles as the enrichment adapter (§4.4)
// and the lookup/registration helpers the agent tracker (§4.5) calls.

use super::{EnrichmentSource, SourceOutcome};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value};
use std::time::Duration;

const CAPABILITY_INDICATORS: &[&str] = &[
    "expert in", "specialized in", "responsible for",
    "manages", "handles", "coordinates", "analyzes",
    "develops", "maintains", "monitors", "tracks",
];

/// Fetch agent details (`name`, `system` prompt, …) straight from the
/// platform API. `None` on any failure.
pub async fn get_agent_details(
    client: &reqwest::Client,
    config: &GatewayConfig,
    agent_id: &str,
) -> Option<Value> {
    let url = config.letta_api_url(&format!("agents/{agent_id}"));
    let mut req = client.get(&url).timeout(Duration::from_secs(10));
    for (k, v) in config.letta_api_headers() {
        req = req.header(k, v);
    }
    match req.send().await {
        Ok(resp) if resp.status().is_success() => resp.json::<Value>().await.ok(),
        Ok(resp) => {
            warn!("[enrich:registry] agent details fetch for {agent_id} returned {}", resp.status());
            None
        }
        Err(e) => {
            warn!("[enrich:registry] agent details fetch for {agent_id} failed: {e}");
            None
        }
    }
}

/// Extract up to 5 capability hints by searching for a fixed indicator
/// vocabulary, each yielding a 100-char window starting at the match.
pub fn extract_capabilities(system_prompt: &str) -> Vec<String> {
    let lower = system_prompt.to_lowercase();
    let mut found = Vec::new();
    for indicator in CAPABILITY_INDICATORS {
        if let Some(byte_idx) = lower.find(indicator) {
            let window: String = system_prompt[byte_idx..].chars().take(100).collect();
            found.push(window.trim().to_string());
        }
        if found.len() >= 5 {
            break;
        }
    }
    found
}

/// Register (or re-register) an agent with the registry service. Best-effort;
/// returns whether the call succeeded.
pub async fn register_agent(
    client: &reqwest::Client,
    config: &GatewayConfig,
    agent_id: &str,
    details: &Value,
) -> bool {
    let name = details
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Agent {agent_id}"));
    let system_prompt = details.get("system").and_then(Value::as_str).unwrap_or_default();
    let description: String = if system_prompt.is_empty() {
        "No description available".to_string()
    } else {
        system_prompt.chars().take(500).collect()
    };
    let capabilities = extract_capabilities(system_prompt);
    let now = Utc::now().to_rfc3339();

    let payload = json!({
        "agent_id": agent_id,
        "name": name,
        "description": description,
        "capabilities": capabilities,
        "status": "active",
        "tags": [],
        "created_at": now,
        "updated_at": now,
    });

    let url = format!("{}/api/v1/agents/register", config.agent_registry_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(10))
        .json(&payload)
        .send()
        .await;

    match resp {
        Ok(resp) if resp.status().is_success() => {
            info!("[enrich:registry] registered agent {agent_id}");
            true
        }
        Ok(resp) => {
            warn!("[enrich:registry] register {agent_id} failed: {}", resp.status());
            false
        }
        Err(e) => {
            warn!("[enrich:registry] register {agent_id} failed: {e}");
            false
        }
    }
}

async fn search_agents(
    client: &reqwest::Client,
    config: &GatewayConfig,
    query: &str,
) -> Result<Vec<Value>, String> {
    let url = format!("{}/api/v1/agents/search", config.agent_registry_url.trim_end_matches('/'));
    let params = [
        ("query", query.to_string()),
        ("limit", config.agent_registry_max_agents.to_string()),
        ("min_score", config.agent_registry_min_score.to_string()),
    ];
    let resp = client
        .get(&url)
        .timeout(Duration::from_secs(10))
        .query(&params)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("status {}", resp.status()));
    }
    let body: Value = resp.json().await.map_err(|e| e.to_string())?;
    Ok(body.get("agents").and_then(Value::as_array).cloned().unwrap_or_default())
}

/// Minimal name/ID/relevance rendering, matching the original byte-for-byte.
pub fn format_agent_context(agents: &[Value]) -> String {
    if agents.is_empty() {
        return "No relevant agents found for the current context.".to_string();
    }
    let mut parts = vec!["Available Agents for Collaboration:\n".to_string()];
    for agent in agents {
        let agent_id = agent.get("agent_id").and_then(Value::as_str).unwrap_or("unknown");
        let name = agent.get("name").and_then(Value::as_str).unwrap_or("Unknown Agent");
        let score = agent.get("score").and_then(Value::as_f64).unwrap_or(0.0);
        parts.push(format!("- {name} ({agent_id}) [relevance: {score:.2}]"));
    }
    parts.push("\nUse matrix_agent_message tool with agent ID to contact them.".to_string());
    parts.join("\n")
}

pub struct AgentRegistrySource {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl AgentRegistrySource {
    pub fn new(client: reqwest::Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl EnrichmentSource for AgentRegistrySource {
    async fn trigger(&self, prompt: &str) -> bool {
        !prompt.trim().is_empty()
    }

    async fn fetch(&self, prompt: &str) -> SourceOutcome {
        match search_agents(&self.client, &self.config, prompt).await {
            Ok(agents) => SourceOutcome::ok(format_agent_context(&agents)),
            Err(e) => {
                warn!("[enrich:registry] search failed: {e}");
                SourceOutcome::failed(format!("Error retrieving available agents: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extract_capabilities_finds_indicator_windows() {
        let prompt = "This agent is specialized in trading and also manages risk across portfolios.";
        let caps = extract_capabilities(prompt);
        assert!(caps.iter().any(|c| c.starts_with("specialized in")));
        assert!(caps.iter().any(|c| c.starts_with("manages")));
    }

    #[test]
    fn extract_capabilities_caps_at_five() {
        let prompt = "expert in a, specialized in b, responsible for c, manages d, handles e, coordinates f";
        assert_eq!(extract_capabilities(prompt).len(), 5);
    }

    #[test]
    fn format_agent_context_empty_list() {
        assert_eq!(format_agent_context(&[]), "No relevant agents found for the current context.");
    }

    #[test]
    fn format_agent_context_renders_entries_and_footer() {
        let agents = vec![json!({"agent_id": "agent-1", "name": "Scout", "score": 0.873})];
        let rendered = format_agent_context(&agents);
        assert!(rendered.starts_with("Available Agents for Collaboration:\n"));
        assert!(rendered.contains("- Scout (agent-1) [relevance: 0.87]"));
        assert!(rendered.ends_with("Use matrix_agent_message tool with agent ID to contact them."));
    }

    #[tokio::test]
    async fn fetch_reports_error_message_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/agents/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let mut config = GatewayConfig::default();
        config.agent_registry_url = server.uri();
        let src = AgentRegistrySource::new(reqwest::Client::new(), config);
        let outcome = src.fetch("find me a collaborator").await;
        assert!(!outcome.success);
        assert!(outcome.context.starts_with("Error retrieving available agents:"));
    }

    #[tokio::test]
    async fn fetch_renders_agents_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/agents/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "agents": [{"agent_id": "agent-9", "name": "Helper", "score": 0.5}],
            })))
            .mount(&server)
            .await;
        let mut config = GatewayConfig::default();
        config.agent_registry_url = server.uri();
        let src = AgentRegistrySource::new(reqwest::Client::new(), config);
        let outcome = src.fetch("anything").await;
        assert!(outcome.success);
        assert!(outcome.context.contains("Helper (agent-9)"));
    }
}
