// ── Knowledge-Graph Search ───────────────────────────────────────────────
// Grounded on `original_source/webhook_server/app.py::query_graphiti_api`
// (exact request envelope, node/edge rendering, fact-text dedup).

use super::{extract_keywords, EnrichmentSource, SourceOutcome};
use crate::http_client::{is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES};
use async_trait::async_trait;
use log::warn;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);
const CIRCUIT_THRESHOLD: u32 = 5;
const CIRCUIT_COOLDOWN_SECS: u64 = 30;

pub struct KnowledgeGraphSource {
    client: reqwest::Client,
    url: String,
    max_nodes: usize,
    max_facts: usize,
    circuit: CircuitBreaker,
}

impl KnowledgeGraphSource {
    pub fn new(client: reqwest::Client, graphiti_url: &str, max_nodes: usize, max_facts: usize) -> Self {
        Self {
            client,
            url: format!("{}/search", graphiti_url.trim_end_matches('/')),
            max_nodes,
            max_facts,
            circuit: CircuitBreaker::new(CIRCUIT_THRESHOLD, CIRCUIT_COOLDOWN_SECS),
        }
    }

    fn build_query(&self, prompt: &str) -> String {
        let keywords = extract_keywords(prompt, 2);
        if keywords.is_empty() {
            prompt.to_string()
        } else {
            format!("{} {}", keywords.join(" "), prompt)
        }
    }

    fn build_payload(&self, query: &str) -> Value {
        json!({
            "query": query,
            "config": {
                "edge_config": {
                    "search_methods": ["bm25", "cosine_similarity"],
                    "reranker": "rrf",
                    "bfs_max_depth": 2,
                    "sim_min_score": 0.6,
                    "mmr_lambda": 0.5,
                },
                "node_config": {
                    "search_methods": ["bm25", "cosine_similarity"],
                    "reranker": "rrf",
                    "centrality_boost_factor": 0.1,
                },
                "limit": self.max_nodes,
                "reranker_min_score": 0,
            },
            "filters": {},
        })
    }

    async fn search(&self, query: &str) -> Result<Value, String> {
        self.circuit.check()?;
        let payload = self.build_payload(query);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .post(&self.url)
                .timeout(TIMEOUT)
                .json(&payload)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    self.circuit.record_success();
                    return resp.json::<Value>().await.map_err(|e| e.to_string());
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    self.circuit.record_failure();
                    if is_retryable_status(status) && attempt < MAX_RETRIES {
                        warn!("[enrich:graphiti] retryable status {status}, attempt {attempt}");
                        retry_delay(attempt, retry_after).await;
                        continue;
                    }
                    return Err(format!("status {status}"));
                }
                Err(e) => {
                    self.circuit.record_failure();
                    if attempt < MAX_RETRIES {
                        warn!("[enrich:graphiti] request error, attempt {attempt}: {e}");
                        retry_delay(attempt, None).await;
                        continue;
                    }
                    return Err(e.to_string());
                }
            }
        }
    }

    fn render(&self, body: &Value) -> String {
        let nodes = body.get("nodes").and_then(Value::as_array).cloned().unwrap_or_default();
        let edges = body.get("edges").and_then(Value::as_array).cloned().unwrap_or_default();

        if nodes.is_empty() && edges.is_empty() {
            return String::new();
        }

        let mut lines = vec!["Relevant Entities from Knowledge Graph:".to_string(), String::new()];

        for node in nodes.iter().take(self.max_nodes) {
            let name = node.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let summary = node.get("summary").and_then(Value::as_str).unwrap_or("");
            lines.push(format!("Node: {name}"));
            lines.push(format!("Summary: {summary}"));
        }

        let mut seen_facts: HashSet<String> = HashSet::new();
        let mut fact_count = 0;
        for edge in &edges {
            if fact_count >= self.max_facts {
                break;
            }
            if let Some(fact) = edge.get("fact").and_then(Value::as_str) {
                if seen_facts.insert(fact.to_string()) {
                    lines.push(format!("Fact: {fact}"));
                    fact_count += 1;
                }
            }
        }

        lines.join("\n")
    }
}

#[async_trait]
impl EnrichmentSource for KnowledgeGraphSource {
    async fn trigger(&self, _prompt: &str) -> bool {
        true
    }

    async fn fetch(&self, prompt: &str) -> SourceOutcome {
        let query = self.build_query(prompt);
        match self.search(&query).await {
            Ok(body) => {
                let rendered = self.render(&body);
                if rendered.is_empty() {
                    SourceOutcome::failed(String::new())
                } else {
                    SourceOutcome::ok(rendered)
                }
            }
            Err(e) => {
                warn!("[enrich:graphiti] search failed: {e}");
                SourceOutcome::failed(format!("Error retrieving knowledge graph context: {e}"))
            }
        }
    }
}
