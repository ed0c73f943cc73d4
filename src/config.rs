// ── Gateway Configuration ───────────────────────────────────────────────────
// A single config struct built once at startup from environment variables.
// No file-based config layer: every tunable here is a flat scalar (a URL, a
// numeric budget, a boolean toggle), so direct env reads are the natural fit
// rather than a TOML/figment layering that a flat key set would never use.

use log::warn;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub letta_base_url: String,
    pub letta_password: String,

    pub graphiti_url: String,
    pub graphiti_max_nodes: usize,
    pub graphiti_max_facts: usize,

    pub matrix_client_url: String,

    pub agent_registry_url: String,
    pub agent_registry_max_agents: usize,
    pub agent_registry_min_score: f64,

    pub tool_selector_url: String,
    pub protected_tools: Vec<String>,

    pub arxiv_enabled: bool,
    pub available_agents_cumulative: bool,

    pub bind_address: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            letta_base_url: "http://localhost:8283".into(),
            letta_password: String::new(),
            graphiti_url: "http://localhost:8000".into(),
            graphiti_max_nodes: 8,
            graphiti_max_facts: 20,
            matrix_client_url: "http://localhost:8091".into(),
            agent_registry_url: "http://localhost:8060".into(),
            agent_registry_max_agents: 10,
            agent_registry_min_score: 0.3,
            tool_selector_url: "http://localhost:8070".into(),
            protected_tools: vec!["find_agents".into()],
            arxiv_enabled: true,
            available_agents_cumulative: true,
            bind_address: "0.0.0.0".into(),
            port: 8088,
        }
    }
}

impl GatewayConfig {
    /// Build configuration from the process environment, falling back to
    /// defaults (with a warning) on missing or malformed values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            letta_base_url: env_string("LETTA_BASE_URL", defaults.letta_base_url),
            letta_password: env_string("LETTA_PASSWORD", defaults.letta_password),
            graphiti_url: env_string("GRAPHITI_URL", defaults.graphiti_url),
            graphiti_max_nodes: env_parsed("GRAPHITI_MAX_NODES", defaults.graphiti_max_nodes),
            graphiti_max_facts: env_parsed("GRAPHITI_MAX_FACTS", defaults.graphiti_max_facts),
            matrix_client_url: env_string("MATRIX_CLIENT_URL", defaults.matrix_client_url),
            agent_registry_url: env_string("AGENT_REGISTRY_URL", defaults.agent_registry_url),
            agent_registry_max_agents: env_parsed(
                "AGENT_REGISTRY_MAX_AGENTS",
                defaults.agent_registry_max_agents,
            ),
            agent_registry_min_score: env_parsed(
                "AGENT_REGISTRY_MIN_SCORE",
                defaults.agent_registry_min_score,
            ),
            tool_selector_url: env_string("TOOL_SELECTOR_URL", defaults.tool_selector_url),
            protected_tools: env_string(
                "PROTECTED_TOOLS",
                defaults.protected_tools.join(","),
            )
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
            arxiv_enabled: env_parsed("ARXIV_ENABLED", defaults.arxiv_enabled),
            available_agents_cumulative: env_parsed(
                "AVAILABLE_AGENTS_CUMULATIVE",
                defaults.available_agents_cumulative,
            ),
            bind_address: env_string("GATEWAY_BIND_ADDRESS", defaults.bind_address),
            port: env_parsed("GATEWAY_PORT", defaults.port),
        }
    }

    pub fn letta_api_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", "application/json".into()),
            ("Accept", "application/json".into()),
            ("X-BARE-PASSWORD", format!("password {}", self.letta_password)),
            ("Authorization", format!("Bearer {}", self.letta_password)),
        ]
    }

    pub fn letta_api_url(&self, path: &str) -> String {
        let base = self.letta_base_url.trim_end_matches('/');
        format!("{base}/v1/{}", path.trim_start_matches('/'))
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("[config] {key}='{raw}' failed to parse, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.letta_base_url, "http://localhost:8283");
        assert_eq!(cfg.graphiti_max_nodes, 8);
        assert_eq!(cfg.graphiti_max_facts, 20);
        assert_eq!(cfg.agent_registry_max_agents, 10);
        assert!((cfg.agent_registry_min_score - 0.3).abs() < f64::EPSILON);
        assert!(cfg.arxiv_enabled);
        assert!(cfg.available_agents_cumulative);
        assert_eq!(cfg.port, 8088);
        assert_eq!(cfg.protected_tools, vec!["find_agents".to_string()]);
    }

    #[test]
    fn letta_api_url_joins_v1() {
        let cfg = GatewayConfig::default();
        assert_eq!(
            cfg.letta_api_url("agents/agent-1/tools"),
            "http://localhost:8283/v1/agents/agent-1/tools"
        );
        assert_eq!(cfg.letta_api_url("/blocks"), "http://localhost:8283/v1/blocks");
    }

    #[test]
    fn letta_api_headers_carry_both_auth_schemes() {
        let mut cfg = GatewayConfig::default();
        cfg.letta_password = "secret".into();
        let headers = cfg.letta_api_headers();
        assert!(headers.iter().any(|(k, v)| *k == "X-BARE-PASSWORD" && v == "password secret"));
        assert!(headers.iter().any(|(k, v)| *k == "Authorization" && v == "Bearer secret"));
    }
}
