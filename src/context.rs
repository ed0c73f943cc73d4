// ── Context Utilities ───────────────────────────────────────────────────────
// Pure, stateless operations over cumulative-context block values: append,
// parse, similarity (baseline + query-aware), and tail-preserving truncation.
//
// Byte-length math throughout operates on UTF-8 byte length (`str::len`), and
// every slice point is rounded down to the nearest `char` boundary — the
// source this is derived from works in Python code points, which never panics
// mid-character; content here can carry arbitrary unicode from knowledge-graph
// and arXiv sources, so we round rather than slice blindly.

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

/// Hard byte cap for a cumulative-context block value.
pub const MAX_CONTEXT_LENGTH: usize = 4800;

const TRUNCATION_NOTICE: &str = "--- OLDER ENTRIES TRUNCATED ---\n\n";
const ARXIV_MARKER: &str = "**Recent Research Papers (arXiv)**";
const GRAPHITI_MARKER: &str = "Relevant Entities from Knowledge Graph:";

static ENTRY_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n--- CONTEXT ENTRY \(([^)]+)\) ---\n\n").unwrap());
static ENTRY_TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--- CONTEXT ENTRY \(([^)]+)\) ---").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: String,
    pub content: String,
}

/// Round `idx` down to the nearest `char` boundary in `s`, never panicking on
/// multi-byte sequences.
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Byte-safe prefix slice of `s`, at most `max` bytes, landing on a char
/// boundary.
fn byte_slice(s: &str, max: usize) -> &str {
    let idx = floor_char_boundary(s, max);
    &s[..idx]
}

/// Byte-safe suffix slice of `s`, at most `max` bytes from the end.
fn byte_suffix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let start = s.len() - max;
    let start = {
        let mut i = start;
        while i < s.len() && !s.is_char_boundary(i) {
            i += 1;
        }
        i
    };
    &s[start..]
}

fn separator(timestamp: &str) -> String {
    format!("\n\n--- CONTEXT ENTRY ({timestamp}) ---\n\n")
}

fn now_marker() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Split `value` into entries. A non-blank prefix before the first marker
/// becomes a `Legacy`-timestamped entry. Entries whose content is blank after
/// trimming are dropped.
pub fn parse(value: &str) -> Vec<Entry> {
    let parts: Vec<&str> = ENTRY_SPLIT_RE.split(value).collect();
    let mut entries = Vec::new();

    if parts.is_empty() {
        return entries;
    }

    let first = parts[0].trim();
    if !first.is_empty() {
        entries.push(Entry { timestamp: "Legacy".into(), content: first.to_string() });
    }

    let timestamps: Vec<&str> = ENTRY_SPLIT_RE
        .captures_iter(value)
        .map(|c| c.get(1).unwrap().as_str())
        .collect();

    for (i, ts) in timestamps.iter().enumerate() {
        if let Some(content) = parts.get(i + 1) {
            let content = content.trim();
            if !content.is_empty() {
                entries.push(Entry { timestamp: ts.to_string(), content: content.to_string() });
            }
        }
    }

    entries
}

/// Baseline similarity: exact-match, containment for very uneven lengths,
/// character-set Jaccard otherwise.
pub fn is_similar(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a_clean = a.trim().to_lowercase();
    let b_clean = b.trim().to_lowercase();

    if a_clean == b_clean {
        return true;
    }

    let shorter = a_clean.chars().count().min(b_clean.chars().count());
    let longer = a_clean.chars().count().max(b_clean.chars().count());
    if shorter == 0 || longer == 0 {
        return false;
    }

    if (shorter as f64) / (longer as f64) < 0.8 {
        return a_clean.contains(&b_clean) || b_clean.contains(&a_clean);
    }

    let set_a: std::collections::HashSet<char> = a_clean.chars().collect();
    let set_b: std::collections::HashSet<char> = b_clean.chars().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return false;
    }
    (intersection as f64) / (union as f64) > 0.9
}

fn extract_arxiv_query(content: &str) -> Option<String> {
    for line in content.lines() {
        if let Some(idx) = line.find("papers relevant to:") {
            let tail = &line[idx + "papers relevant to:".len()..];
            return Some(tail.trim().trim_end_matches('*').trim().to_string());
        }
    }
    None
}

/// Overrides the baseline for arXiv and Graphiti content families so two
/// genuinely different retrievals whose bodies happen to overlap are never
/// collapsed by the character-Jaccard baseline.
pub fn is_similar_with_query_awareness(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }

    if a.contains(ARXIV_MARKER) && b.contains(ARXIV_MARKER) {
        let qa = extract_arxiv_query(a);
        let qb = extract_arxiv_query(b);
        if let (Some(qa), Some(qb)) = (&qa, &qb) {
            if qa != qb {
                return false;
            }
            // queries match — fall through to baseline
        }
    }

    if a.contains(GRAPHITI_MARKER) && b.contains(GRAPHITI_MARKER) {
        let ts_a: Vec<&str> = ENTRY_TIMESTAMP_RE
            .captures_iter(a)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        let ts_b: Vec<&str> = ENTRY_TIMESTAMP_RE
            .captures_iter(b)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();

        if !ts_a.is_empty() && !ts_b.is_empty() {
            if ts_a.last() != ts_b.last() {
                return false;
            }
        } else if ts_a.is_empty() && ts_b.is_empty() {
            return false;
        }
    }

    is_similar(a, b)
}

fn format_entry(entry: &Entry) -> String {
    if entry.timestamp == "Legacy" {
        entry.content.clone()
    } else {
        format!("\n\n--- CONTEXT ENTRY ({}) ---\n\n{}", entry.timestamp, entry.content)
    }
}

/// Truncate `value` to at most `max` bytes, preserving the tail entry above
/// all else — the newest entry is always the reason we're writing.
pub fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }

    let entries = parse(value);
    let Some(tail) = entries.last() else {
        return byte_suffix(value, max).to_string();
    };

    let recent_formatted = format_entry(tail);

    if recent_formatted.len() + TRUNCATION_NOTICE.len() <= max {
        let mut result_entries = vec![recent_formatted.clone()];
        let mut current_length = recent_formatted.len();

        for entry in entries[..entries.len() - 1].iter().rev() {
            let formatted = format_entry(entry);
            let proposed = current_length + formatted.len() + TRUNCATION_NOTICE.len();
            if proposed <= max {
                result_entries.insert(0, formatted.clone());
                current_length += formatted.len();
            } else {
                break;
            }
        }
        if result_entries.len() > 1 || entries.len() > 1 {
            result_entries.insert(0, TRUNCATION_NOTICE.trim_end().to_string());
        }
        result_entries.concat()
    } else {
        let available = max.saturating_sub(TRUNCATION_NOTICE.len()).saturating_sub(100);
        if available > 500 {
            let sliced = byte_slice(&tail.content, available);
            let truncated_content = format!("{sliced}\n\n[CONTENT TRUNCATED]");
            if tail.timestamp == "Legacy" {
                format!("{TRUNCATION_NOTICE}{truncated_content}")
            } else {
                format!(
                    "{TRUNCATION_NOTICE}\n\n--- CONTEXT ENTRY ({}) ---\n\n{truncated_content}",
                    tail.timestamp
                )
            }
        } else {
            byte_suffix(&recent_formatted, max).to_string()
        }
    }
}

/// Append `new` onto `existing`, deduplicating against the most recent entry
/// and truncating to `MAX_CONTEXT_LENGTH` while preserving the new content.
pub fn append(existing: &str, new: &str) -> String {
    if existing.trim().is_empty() {
        return new.to_string();
    }
    if new.trim().is_empty() {
        return existing.to_string();
    }

    let existing_entries = parse(existing);
    if let Some(most_recent) = existing_entries.last() {
        if is_similar_with_query_awareness(&most_recent.content, new) {
            return existing.to_string();
        }
    }

    let sep = separator(&now_marker());
    let mut cumulative = format!("{existing}{sep}{new}");

    if cumulative.len() > MAX_CONTEXT_LENGTH {
        cumulative = truncate(&cumulative, MAX_CONTEXT_LENGTH);

        if cumulative.trim() == "--- OLDER ENTRIES TRUNCATED ---" {
            cumulative = format!("--- OLDER ENTRIES TRUNCATED ---{sep}{new}");

            if cumulative.len() > MAX_CONTEXT_LENGTH {
                let available = MAX_CONTEXT_LENGTH
                    .saturating_sub("--- OLDER ENTRIES TRUNCATED ---".len())
                    .saturating_sub(sep.len())
                    .saturating_sub(100);
                if available > 500 {
                    let sliced = byte_slice(new, available);
                    let truncated_new = format!("{sliced}\n\n[CONTENT TRUNCATED]");
                    cumulative =
                        format!("--- OLDER ENTRIES TRUNCATED ---{sep}{truncated_new}");
                } else {
                    cumulative = new.to_string();
                }
            }
        }
    }

    cumulative
}
