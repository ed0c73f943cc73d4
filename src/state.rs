// ── Gateway State ────────────────────────────────────────────────────────
// The two pieces of genuinely shared, mutable process state (§5, §9):
// the known-agents set (guards one-shot agent-registration side effects)
// and the per-agent recent-tool-attachments ring buffer. Both are encapsulated
// here as a typed state object threaded through the axum router as extractor
// state, rather than living in a module-level `static` (the source's pattern).

use crate::config::GatewayConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// Capacity of the per-agent recent-attachments ring buffer (§3).
const RECENT_ATTACHMENTS_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    pub tool_name: String,
    pub tool_id: String,
    pub reason: String,
    pub score: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct GatewayState {
    pub config: GatewayConfig,
    pub client: reqwest::Client,
    known_agents: Mutex<HashSet<String>>,
    recent_attachments: Mutex<HashMap<String, VecDeque<AttachmentRecord>>>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            known_agents: Mutex::new(HashSet::new()),
            recent_attachments: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically test-and-insert. Returns `true` the first time a given
    /// `agent_id` is seen this process lifetime. The mutex covers both the
    /// membership test and the insert, so two concurrent webhooks for the
    /// same brand-new agent can never both win.
    pub fn mark_known(&self, agent_id: &str) -> bool {
        let mut known = self.known_agents.lock();
        known.insert(agent_id.to_string())
    }

    pub fn known_agents(&self) -> Vec<String> {
        self.known_agents.lock().iter().cloned().collect()
    }

    pub fn reset_known_agents(&self) -> usize {
        let mut known = self.known_agents.lock();
        let count = known.len();
        known.clear();
        count
    }

    /// Push a new attachment record to the front of the agent's ring buffer,
    /// trimming to `RECENT_ATTACHMENTS_CAPACITY`.
    pub fn record_attachment(&self, agent_id: &str, record: AttachmentRecord) {
        let mut map = self.recent_attachments.lock();
        let deque = map.entry(agent_id.to_string()).or_default();
        deque.push_front(record);
        deque.truncate(RECENT_ATTACHMENTS_CAPACITY);
    }

    /// Newest-first, up to `limit` records for an agent.
    pub fn recent_attachments(&self, agent_id: &str, limit: usize) -> Vec<AttachmentRecord> {
        let map = self.recent_attachments.lock();
        map.get(agent_id)
            .map(|deque| deque.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GatewayState {
        GatewayState::new(GatewayConfig::default(), reqwest::Client::new())
    }

    #[test]
    fn mark_known_fires_once() {
        let s = state();
        assert!(s.mark_known("agent-alpha"));
        assert!(!s.mark_known("agent-alpha"));
        assert!(s.mark_known("agent-beta"));
    }

    #[test]
    fn reset_clears_known_agents() {
        let s = state();
        s.mark_known("agent-alpha");
        s.mark_known("agent-beta");
        assert_eq!(s.reset_known_agents(), 2);
        assert!(s.known_agents().is_empty());
        assert!(s.mark_known("agent-alpha"));
    }

    #[test]
    fn recent_attachments_ring_buffer_caps_and_orders_newest_first() {
        let s = state();
        for i in 0..15 {
            s.record_attachment(
                "agent-x",
                AttachmentRecord {
                    tool_name: format!("tool-{i}"),
                    tool_id: format!("id-{i}"),
                    reason: "auto: 'test'".into(),
                    score: 80.0,
                    timestamp: chrono::Utc::now(),
                },
            );
        }
        let recent = s.recent_attachments("agent-x", 100);
        assert_eq!(recent.len(), RECENT_ATTACHMENTS_CAPACITY);
        assert_eq!(recent[0].tool_name, "tool-14");
    }

    #[test]
    fn recent_attachments_are_per_agent_independent() {
        let s = state();
        s.record_attachment(
            "agent-a",
            AttachmentRecord {
                tool_name: "t".into(),
                tool_id: "1".into(),
                reason: "auto".into(),
                score: 90.0,
                timestamp: chrono::Utc::now(),
            },
        );
        assert_eq!(s.recent_attachments("agent-a", 5).len(), 1);
        assert_eq!(s.recent_attachments("agent-b", 5).len(), 0);
    }
}
