// ── Memory-Block Manager ────────────────────────────────────────────────────
// Operates against the agent-platform REST API. Four operations, all
// idempotent: find, update, attach, create_or_update (+ the snapshot variant
// create_tool_inventory).

use crate::config::GatewayConfig;
use crate::context;
use crate::error::{GatewayError, GatewayResult};
use crate::types::{coerce_block_id, extract_array, object_to_value, MemoryBlock, NewBlockData};
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};

pub struct MemoryBlockManager<'a> {
    client: &'a Client,
    config: &'a GatewayConfig,
}

impl<'a> MemoryBlockManager<'a> {
    pub fn new(client: &'a Client, config: &'a GatewayConfig) -> Self {
        Self { client, config }
    }

    /// Two-stage lookup: agent-attached blocks, then global blocks.
    /// Any HTTP/network/parse failure collapses to `(None, false)`.
    pub async fn find(&self, agent_id: &str, label: &str) -> (Option<MemoryBlock>, bool) {
        let agent_url = self.config.letta_api_url(&format!("agents/{agent_id}/core-memory/blocks"));
        let mut req = self.client.get(&agent_url).timeout(std::time::Duration::from_secs(10));
        for (k, v) in self.config.letta_api_headers() {
            req = req.header(k, v);
        }
        req = req.header("user_id", agent_id);

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(body) = resp.json::<Value>().await {
                    for item in extract_array(&body, "blocks") {
                        if item.get("label").and_then(Value::as_str) == Some(label) {
                            if let Ok(block) = serde_json::from_value::<MemoryBlock>(item) {
                                info!("[memory-block] found attached '{label}' block (id={})", block.id);
                                return (Some(block), true);
                            }
                        }
                    }
                }
            }
            Ok(resp) => warn!("[memory-block] agent-blocks lookup for {agent_id} returned {}", resp.status()),
            Err(e) => warn!("[memory-block] agent-blocks lookup failed for {agent_id}: {e}"),
        }

        let global_url = self.config.letta_api_url("blocks");
        let mut req = self
            .client
            .get(&global_url)
            .timeout(std::time::Duration::from_secs(10))
            .query(&[("label", label), ("templates_only", "false")]);
        for (k, v) in self.config.letta_api_headers() {
            req = req.header(k, v);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(body) = resp.json::<Value>().await {
                    let items = extract_array(&body, "blocks");
                    if let Some(first) = items.into_iter().next() {
                        if let Ok(block) = serde_json::from_value::<MemoryBlock>(first) {
                            info!("[memory-block] found global unattached '{label}' block (id={})", block.id);
                            return (Some(block), false);
                        }
                    }
                }
            }
            Ok(resp) => warn!("[memory-block] global-blocks lookup for label {label} returned {}", resp.status()),
            Err(e) => warn!("[memory-block] global-blocks lookup failed for label {label}: {e}"),
        }

        (None, false)
    }

    /// Fetch the current value (via `existing` if supplied, else GET), apply
    /// the cumulative append, and PATCH the result.
    pub async fn update(
        &self,
        block_id: &str,
        new_data: &NewBlockData,
        agent_id: Option<&str>,
        existing: Option<&MemoryBlock>,
    ) -> GatewayResult<MemoryBlock> {
        let current_value = match existing {
            Some(b) => b.value.clone(),
            None => self.fetch_block_value(block_id).await.unwrap_or_default(),
        };

        let merged = context::append(&current_value, &new_data.value);
        self.patch_value(block_id, &merged, &new_data.metadata, agent_id).await
    }

    /// Snapshot write: overwrites `value` directly, never calling `append`.
    pub async fn overwrite(
        &self,
        block_id: &str,
        content: &str,
        metadata: &std::collections::HashMap<String, Value>,
        agent_id: Option<&str>,
    ) -> GatewayResult<MemoryBlock> {
        self.patch_value(block_id, content, metadata, agent_id).await
    }

    async fn fetch_block_value(&self, block_id: &str) -> Option<String> {
        let url = self.config.letta_api_url(&format!("blocks/{block_id}"));
        let mut req = self.client.get(&url).timeout(std::time::Duration::from_secs(10));
        for (k, v) in self.config.letta_api_headers() {
            req = req.header(k, v);
        }
        let resp = req.send().await.ok()?;
        let body: Value = resp.json().await.ok()?;
        body.get("value").and_then(Value::as_str).map(String::from)
    }

    async fn patch_value(
        &self,
        block_id: &str,
        value: &str,
        metadata: &std::collections::HashMap<String, Value>,
        agent_id: Option<&str>,
    ) -> GatewayResult<MemoryBlock> {
        let url = self.config.letta_api_url(&format!("blocks/{block_id}"));
        let payload = json!({ "value": value, "metadata": object_to_value(metadata.clone()) });

        let mut req = self.client.patch(&url).timeout(std::time::Duration::from_secs(10)).json(&payload);
        for (k, v) in self.config.letta_api_headers() {
            req = req.header(k, v);
        }
        if let Some(agent_id) = agent_id {
            req = req.header("user_id", agent_id);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(GatewayError::downstream(
                "letta",
                format!("PATCH /blocks/{block_id} failed: {}", resp.status()),
            ));
        }
        Ok(resp.json::<MemoryBlock>().await?)
    }

    /// PATCH the attach endpoint. HTTP 200-299 and 409 Conflict both mean
    /// "attached" — spec.md's authoritative contract, overriding the literal
    /// original's `raise_for_status()` which would treat 409 as failure.
    pub async fn attach(&self, agent_id: &str, block_id: &Value) -> bool {
        let Some(block_id) = coerce_block_id(block_id) else {
            warn!("[memory-block] attach: block_id coerced to None, aborting");
            return false;
        };

        let url = self
            .config
            .letta_api_url(&format!("agents/{agent_id}/core-memory/blocks/attach/{block_id}"));
        let mut req = self.client.patch(&url).timeout(std::time::Duration::from_secs(10));
        for (k, v) in self.config.letta_api_headers() {
            req = req.header(k, v);
        }
        req = req.header("user_id", agent_id);

        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() || status.as_u16() == 409 {
                    info!("[memory-block] attached block {block_id} to {agent_id} (status={status})");
                    true
                } else {
                    warn!("[memory-block] attach {block_id} to {agent_id} failed: {status}");
                    false
                }
            }
            Err(e) => {
                warn!("[memory-block] attach {block_id} to {agent_id} network error: {e}");
                false
            }
        }
    }

    /// The state-machine reconciler: unknown / global-unattached / attached.
    pub async fn create_or_update(
        &self,
        block_data: &NewBlockData,
        agent_id: Option<&str>,
    ) -> GatewayResult<MemoryBlock> {
        if let Some(agent_id) = agent_id {
            let (existing, attached) = self.find(agent_id, &block_data.label).await;
            if let Some(block) = existing {
                if !attached {
                    self.attach(agent_id, &Value::String(block.id.clone())).await;
                }
                return self.update(&block.id, block_data, Some(agent_id), Some(&block)).await;
            }
        }

        self.create(block_data, agent_id).await
    }

    /// Snapshot variant used by the tool-inventory block: label is fixed to
    /// `available_tools` by the caller; the write path overwrites rather than
    /// appends.
    pub async fn create_tool_inventory(
        &self,
        agent_id: &str,
        content: &str,
    ) -> GatewayResult<MemoryBlock> {
        let metadata: std::collections::HashMap<String, Value> =
            [("source".to_string(), json!("webhook")), ("type".to_string(), json!("tool_inventory"))]
                .into_iter()
                .collect();
        self.create_or_update_snapshot("available_tools", content, &metadata, agent_id).await
    }

    /// General-purpose snapshot reconciler: same find/attach state machine as
    /// `create_or_update`, but the write always overwrites rather than
    /// cumulative-appends. Used for `available_agents` when
    /// `AVAILABLE_AGENTS_CUMULATIVE` is disabled.
    pub async fn create_or_update_snapshot(
        &self,
        label: &str,
        content: &str,
        metadata: &std::collections::HashMap<String, Value>,
        agent_id: &str,
    ) -> GatewayResult<MemoryBlock> {
        let (existing, attached) = self.find(agent_id, label).await;

        if let Some(block) = existing {
            if !attached {
                self.attach(agent_id, &Value::String(block.id.clone())).await;
            }
            return self.overwrite(&block.id, content, metadata, Some(agent_id)).await;
        }

        let new_data = NewBlockData {
            label: label.into(),
            value: content.into(),
            metadata: metadata.clone(),
        };
        self.create(&new_data, Some(agent_id)).await
    }

    async fn create(
        &self,
        block_data: &NewBlockData,
        agent_id: Option<&str>,
    ) -> GatewayResult<MemoryBlock> {
        let url = self.config.letta_api_url("blocks");
        let payload = json!({
            "label": block_data.label,
            "value": block_data.value,
            "metadata": object_to_value(block_data.metadata.clone()),
        });

        let mut req = self.client.post(&url).timeout(std::time::Duration::from_secs(10)).json(&payload);
        for (k, v) in self.config.letta_api_headers() {
            req = req.header(k, v);
        }
        if let Some(agent_id) = agent_id {
            req = req.header("user_id", agent_id);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(GatewayError::downstream("letta", format!("POST /blocks failed: {}", resp.status())));
        }
        let new_block: MemoryBlock = resp.json().await?;

        if let Some(agent_id) = agent_id {
            info!("[memory-block] auto-attaching newly created block {} to {agent_id}", new_block.id);
            self.attach(agent_id, &Value::String(new_block.id.clone())).await;
        }

        Ok(new_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(base_url: String) -> GatewayConfig {
        let mut c = GatewayConfig::default();
        c.letta_base_url = base_url;
        c
    }

    #[tokio::test]
    async fn find_returns_attached_block_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agents/agent-x/core-memory/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b1", "label": "graphiti_context", "value": "hi", "metadata": {}}
            ])))
            .mount(&server)
            .await;

        let client = Client::new();
        let config = cfg(server.uri());
        let mgr = MemoryBlockManager::new(&client, &config);
        let (block, attached) = mgr.find("agent-x", "graphiti_context").await;
        assert!(attached);
        assert_eq!(block.unwrap().id, "b1");
    }

    #[tokio::test]
    async fn find_falls_back_to_global_unattached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agents/agent-y/core-memory/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/blocks"))
            .and(query_param("label", "available_tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "blocks": [{"id": "b2", "label": "available_tools", "value": "", "metadata": {}}]
            })))
            .mount(&server)
            .await;

        let client = Client::new();
        let config = cfg(server.uri());
        let mgr = MemoryBlockManager::new(&client, &config);
        let (block, attached) = mgr.find("agent-y", "available_tools").await;
        assert!(!attached);
        assert_eq!(block.unwrap().id, "b2");
    }

    #[tokio::test]
    async fn find_collapses_failures_to_none() {
        let server = MockServer::start().await;
        // No mocks registered — every request 404s by default in wiremock.
        let client = Client::new();
        let config = cfg(server.uri());
        let mgr = MemoryBlockManager::new(&client, &config);
        let (block, attached) = mgr.find("agent-z", "graphiti_context").await;
        assert!(block.is_none());
        assert!(!attached);
    }

    #[tokio::test]
    async fn attach_treats_409_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/agents/agent-a/core-memory/blocks/attach/b1"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = Client::new();
        let config = cfg(server.uri());
        let mgr = MemoryBlockManager::new(&client, &config);
        let ok = mgr.attach("agent-a", &json!("b1")).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn attach_coerces_list_shaped_block_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/agents/agent-a/core-memory/blocks/attach/b1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let config = cfg(server.uri());
        let mgr = MemoryBlockManager::new(&client, &config);
        let ok = mgr.attach("agent-a", &json!(["b1", "b2"])).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn attach_fails_on_other_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/agents/agent-a/core-memory/blocks/attach/b1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = Client::new();
        let config = cfg(server.uri());
        let mgr = MemoryBlockManager::new(&client, &config);
        let ok = mgr.attach("agent-a", &json!("b1")).await;
        assert!(!ok);
    }
}
