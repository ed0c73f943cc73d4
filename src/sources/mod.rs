// ── Enrichment Sources ───────────────────────────────────────────────────
// Three independent adapters unified behind one trait so the handler's
// fan-out can hold a homogeneous collection and loop, rather than a
// hand-written call site per adapter. Grounded on the type-erasure shape of
// `src-tauri/src/engine/providers/mod.rs`'s `AnyProvider(Box<dyn AiProvider>)`.

pub mod agent_registry;
pub mod arxiv;
pub mod knowledge_graph;

use async_trait::async_trait;

/// Result of an enrichment fetch: the rendered context block and whether the
/// underlying call actually produced data (a human-readable failure message
/// still counts as `success: false`, but is still useful context).
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub context: String,
    pub success: bool,
}

impl SourceOutcome {
    pub fn ok(context: impl Into<String>) -> Self {
        Self { context: context.into(), success: true }
    }

    pub fn failed(context: impl Into<String>) -> Self {
        Self { context: context.into(), success: false }
    }
}

#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Cheap, synchronous-feeling predicate deciding whether this source
    /// should be consulted for the given prompt.
    async fn trigger(&self, prompt: &str) -> bool;

    /// Perform the actual lookup. Only called when `trigger` returned true.
    async fn fetch(&self, prompt: &str) -> SourceOutcome;
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
    "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "what",
    "which", "who", "whom", "whose", "when", "where", "why", "how", "please", "just", "also",
];

/// Extract up to `n` "content words" from `text`: lower-cased, stop-words and
/// short tokens (len <= 3) dropped, in original order.
pub(crate) fn extract_keywords(text: &str, n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.split_whitespace() {
        let word: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if word.len() <= 3 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if !out.contains(&word) {
            out.push(word);
        }
        if out.len() >= n {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_keywords_drops_stopwords_and_short_tokens() {
        let words = extract_keywords("what is the latest research on quantum computing", 2);
        assert_eq!(words, vec!["latest".to_string(), "research".to_string()]);
    }

    #[test]
    fn extract_keywords_dedups() {
        let words = extract_keywords("database database migration tooling", 5);
        assert_eq!(words, vec!["database".to_string(), "migration".to_string(), "tooling".to_string()]);
    }
}
