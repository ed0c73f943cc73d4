// ── Tool Inventory ───────────────────────────────────────────────────────
// Fetch-and-categorize an agent's attached tools, render a compact snapshot,
// and track the per-agent recent-attachments ring buffer that the render
// surfaces. Grounded on `original_source/webhook_server/tool_inventory.py`
// (exact `CATEGORY_MAPPING`, `CORE_TOOL_NAMES`, render format) and the
// category-lookup idiom of `src-tauri/src/engine/tool_index.rs::tool_domain`.

use crate::config::GatewayConfig;
use crate::state::{AttachmentRecord, GatewayState};
use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

const MAX_INVENTORY_BYTES: usize = 4500;
const TRUNCATED_INVENTORY_BYTES: usize = 4450;
const TOOLS_PER_CATEGORY: usize = 5;
const DESCRIPTION_MAX_CHARS: usize = 77;

const PRIORITY_CATEGORIES: &[&str] = &[
    "Core",
    "Web Search",
    "Communication",
    "Knowledge Graph",
    "Project Management",
    "Code Execution",
];

static CATEGORY_MAPPING: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("Searxng", "Web Search"),
        ("bookstack", "Knowledge & Docs"),
        ("ghost", "Content Publishing"),
        ("postiz", "Social Media"),
        ("huly", "Project Management"),
        ("vibekanban", "Project Management"),
        ("vibekanban_system", "Project Management"),
        ("filesystem", "Filesystem"),
        ("penpot", "Design"),
        ("photoprism", "Media"),
        ("graphiti", "Knowledge Graph"),
        ("lettachat", "Communication"),
        ("matrix", "Communication"),
        ("agent_registry", "Agent Discovery"),
        ("fin", "Finance"),
        ("komodo", "DevOps"),
        ("claude-code-mcp", "Code Execution"),
        ("opencode", "Code Execution"),
        ("Letta_code", "Code Execution"),
        ("payloadcms", "CMS"),
        ("resume", "Personal Data"),
        ("context7", "Documentation"),
        ("letta", "Agent Management"),
        ("lettatoolsselector", "Tool Management"),
    ])
});

const CORE_TOOL_NAMES: &[&str] = &[
    "send_message",
    "conversation_search",
    "conversation_search_date",
    "archival_memory_insert",
    "archival_memory_search",
    "core_memory_append",
    "core_memory_replace",
];

/// `GET /agents/{agent_id}/tools` with `user_id` header; `[]` on any failure.
pub async fn fetch_agent_tools(
    client: &reqwest::Client,
    config: &GatewayConfig,
    agent_id: &str,
) -> Vec<Value> {
    let url = config.letta_api_url(&format!("agents/{agent_id}/tools"));
    let mut req = client.get(&url).timeout(std::time::Duration::from_secs(15));
    for (k, v) in config.letta_api_headers() {
        req = req.header(k, v);
    }
    req = req.header("user_id", agent_id);

    match req.send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Ok(resp) => {
            warn!("[tool-inventory] tools fetch for {agent_id} returned {}", resp.status());
            Vec::new()
        }
        Err(e) => {
            warn!("[tool-inventory] tools fetch for {agent_id} failed: {e}");
            Vec::new()
        }
    }
}

fn mcp_server_name(tool: &Value) -> Option<String> {
    if let Some(name) = tool
        .get("metadata_")
        .and_then(|m| m.get("mcp"))
        .and_then(|mcp| mcp.get("server_name"))
        .and_then(Value::as_str)
    {
        return Some(name.to_string());
    }
    if let Some(name) = tool.get("mcp_server_name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    if let Some(tags) = tool.get("tags").and_then(Value::as_array) {
        for tag in tags {
            if let Some(tag) = tag.as_str() {
                if let Some(name) = tag.to_lowercase().split("mcp:").nth(1) {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

/// Map a tool to its category: `Core` by name, else MCP-server lookup, else `Other`.
pub fn categorize_tool(tool: &Value) -> &'static str {
    let name = tool.get("name").and_then(Value::as_str).unwrap_or_default();
    if CORE_TOOL_NAMES.contains(&name) {
        return "Core";
    }
    if let Some(server) = mcp_server_name(tool) {
        if let Some(category) = CATEGORY_MAPPING.get(server.as_str()) {
            return category;
        }
    }
    "Other"
}

fn categorize_tools(tools: &[Value]) -> HashMap<&'static str, Vec<&Value>> {
    let mut categorized: HashMap<&'static str, Vec<&Value>> = HashMap::new();
    for tool in tools {
        categorized.entry(categorize_tool(tool)).or_default().push(tool);
    }
    categorized
}

fn format_tool_entry(tool: &Value) -> String {
    let name = tool.get("name").and_then(Value::as_str).unwrap_or("unknown");
    let description = tool.get("description").and_then(Value::as_str).unwrap_or("");
    if description.is_empty() {
        return format!("• {name}");
    }
    let truncated: String = if description.chars().count() > DESCRIPTION_MAX_CHARS {
        let prefix: String = description.chars().take(DESCRIPTION_MAX_CHARS).collect();
        format!("{prefix}…")
    } else {
        description.to_string()
    };
    format!("• {name} - {truncated}")
}

/// Record a successful tool attachment in the agent's ring buffer.
/// `reason` is built from the first three whitespace-separated tokens of the
/// inbound prompt, prefixed `auto: '…'`.
pub fn record_attachment(state: &GatewayState, agent_id: &str, prompt: &str, tool_name: &str, tool_id: &str, score: f64) {
    let keywords: Vec<&str> = prompt.split_whitespace().take(3).collect();
    let reason = format!("auto: '{}'", keywords.join(" "));
    state.record_attachment(
        agent_id,
        AttachmentRecord {
            tool_name: tool_name.to_string(),
            tool_id: tool_id.to_string(),
            reason,
            score,
            timestamp: Utc::now(),
        },
    );
}

/// Render the recently-attached section, at most 3 entries.
fn render_recent(recent: &[AttachmentRecord]) -> Vec<String> {
    if recent.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["═══ Recently Attached ═══".to_string()];
    for record in recent.iter().take(3) {
        lines.push(format!("• {}", record.tool_name));
        lines.push(format!(
            "  └─ [{} • score: {:.0}% • {}]",
            record.reason,
            record.score,
            record.timestamp.format("%Y-%m-%d %H:%M")
        ));
    }
    lines.push(String::new());
    lines
}

fn render_category(name: &str, tools: &[&Value], exclude_ids: &std::collections::HashSet<String>) -> Vec<String> {
    let visible: Vec<&&Value> = tools
        .iter()
        .filter(|t| {
            let id = t.get("id").and_then(Value::as_str).unwrap_or_default();
            !exclude_ids.contains(id)
        })
        .take(TOOLS_PER_CATEGORY)
        .collect();
    if visible.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("═══ {name} ═══")];
    for tool in visible {
        lines.push(format_tool_entry(tool));
    }
    lines.push(String::new());
    lines
}

/// Render the full tool-inventory snapshot for an agent's current tool set.
pub fn render_snapshot(state: &GatewayState, agent_id: &str, tools: &[Value]) -> String {
    if tools.is_empty() {
        return "🛠️ Available Tools: None currently attached.".to_string();
    }

    let categorized = categorize_tools(tools);
    let recent = state.recent_attachments(agent_id, 3);
    let recent_ids: std::collections::HashSet<String> = recent.iter().map(|r| r.tool_id.clone()).collect();

    let mut lines = vec![format!("🛠️ Available Tools ({} total)", tools.len()), String::new()];
    lines.extend(render_recent(&recent));

    let mut shown = std::collections::HashSet::new();
    for category in PRIORITY_CATEGORIES {
        if let Some(tools) = categorized.get(*category) {
            lines.extend(render_category(category, tools, &recent_ids));
            shown.insert(*category);
        }
    }

    let mut remaining: Vec<&&str> = categorized.keys().filter(|c| !shown.contains(**c)).collect();
    remaining.sort();
    for category in remaining {
        lines.extend(render_category(category, &categorized[category], &recent_ids));
    }

    lines.push(format!("[Last updated: {}]", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")));

    let mut rendered = lines.join("\n");
    if rendered.len() > MAX_INVENTORY_BYTES {
        info!("[tool-inventory] snapshot too long ({} bytes), truncating", rendered.len());
        let mut idx = TRUNCATED_INVENTORY_BYTES.min(rendered.len());
        while idx > 0 && !rendered.is_char_boundary(idx) {
            idx -= 1;
        }
        rendered = format!("{}\n…\n[Content truncated]", &rendered[..idx]);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> GatewayState {
        GatewayState::new(GatewayConfig::default(), reqwest::Client::new())
    }

    #[test]
    fn categorize_core_tool_by_name() {
        let tool = json!({"name": "send_message"});
        assert_eq!(categorize_tool(&tool), "Core");
    }

    #[test]
    fn categorize_by_mcp_server_metadata() {
        let tool = json!({"name": "kg_search", "metadata_": {"mcp": {"server_name": "graphiti"}}});
        assert_eq!(categorize_tool(&tool), "Knowledge Graph");
    }

    #[test]
    fn categorize_by_mcp_server_name_field() {
        let tool = json!({"name": "huly_create", "mcp_server_name": "huly"});
        assert_eq!(categorize_tool(&tool), "Project Management");
    }

    #[test]
    fn categorize_by_mcp_tag() {
        let tool = json!({"name": "x", "tags": ["mcp:matrix"]});
        assert_eq!(categorize_tool(&tool), "Communication");
    }

    #[test]
    fn categorize_unknown_falls_back_to_other() {
        let tool = json!({"name": "mystery_tool"});
        assert_eq!(categorize_tool(&tool), "Other");
    }

    #[test]
    fn render_snapshot_empty_tools() {
        let s = state();
        assert_eq!(render_snapshot(&s, "agent-x", &[]), "🛠️ Available Tools: None currently attached.");
    }

    #[test]
    fn render_snapshot_includes_recent_and_category_headers() {
        let s = state();
        record_attachment(&s, "agent-x", "find me a search tool please", "web_search", "tool-1", 88.0);
        let tools = vec![
            json!({"id": "tool-1", "name": "web_search", "description": "Search the web", "mcp_server_name": "Searxng"}),
            json!({"id": "tool-2", "name": "send_message", "description": "Send a message to the user"}),
        ];
        let rendered = render_snapshot(&s, "agent-x", &tools);
        assert!(rendered.starts_with("🛠️ Available Tools (2 total)"));
        assert!(rendered.contains("═══ Recently Attached ═══"));
        assert!(rendered.contains("auto: 'find me a'"));
        assert!(rendered.contains("═══ Core ═══"));
        // web_search was surfaced in Recently Attached, so it must not repeat under Web Search.
        assert!(!rendered.contains("═══ Web Search ═══"));
        assert!(rendered.contains("[Last updated:"));
    }

    #[test]
    fn render_snapshot_truncates_when_oversize() {
        let s = state();
        let tools: Vec<Value> = (0..200)
            .map(|i| json!({"id": format!("id-{i}"), "name": format!("tool_{i}"), "description": "a".repeat(80)}))
            .collect();
        let rendered = render_snapshot(&s, "agent-x", &tools);
        assert!(rendered.len() <= TRUNCATED_INVENTORY_BYTES + 64);
        assert!(rendered.ends_with("[Content truncated]"));
    }

    #[test]
    fn description_truncated_at_77_chars() {
        let tool = json!({"name": "x", "description": "y".repeat(100)});
        let entry = format_tool_entry(&tool);
        assert!(entry.contains('…'));
        assert!(entry.len() < "• x - ".len() + 79);
    }
}
