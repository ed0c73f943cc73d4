// ── Shared Wire Types ────────────────────────────────────────────────────────
// Dynamic JSON shapes (list-or-wrapper-object responses, `block_id` occasionally
// arriving as a one-element list) are normalized here at the adapter boundary;
// the ambiguity never leaks past this module.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBlockData {
    pub label: String,
    pub value: String,
    pub metadata: HashMap<String, Value>,
}

/// A response that is either a bare JSON array, or an object wrapping the
/// array under a known key (`"blocks"`, `"agents"`, ...). Both shapes are
/// accepted; anything else normalizes to empty.
pub fn extract_array(value: &Value, wrapper_key: &str) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get(wrapper_key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Defensively coerce a `block_id` field that may arrive as a plain string,
/// a number, or a one-element list, into its string form.
pub fn coerce_block_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(coerce_block_id),
        _ => None,
    }
}

pub fn metadata_map(source: Option<&Value>) -> HashMap<String, Value> {
    match source {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        _ => HashMap::new(),
    }
}

pub fn object_to_value(map: HashMap<String, Value>) -> Value {
    Value::Object(Map::from_iter(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_array_from_bare_list() {
        let v = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(extract_array(&v, "blocks").len(), 2);
    }

    #[test]
    fn extract_array_from_wrapper_object() {
        let v = json!({"blocks": [{"id": 1}]});
        assert_eq!(extract_array(&v, "blocks").len(), 1);
    }

    #[test]
    fn extract_array_missing_key_is_empty() {
        let v = json!({"other": []});
        assert!(extract_array(&v, "blocks").is_empty());
    }

    #[test]
    fn coerce_block_id_from_string() {
        assert_eq!(coerce_block_id(&json!("abc")), Some("abc".to_string()));
    }

    #[test]
    fn coerce_block_id_from_list() {
        assert_eq!(coerce_block_id(&json!(["abc", "def"])), Some("abc".to_string()));
    }

    #[test]
    fn coerce_block_id_from_empty_list_is_none() {
        assert_eq!(coerce_block_id(&json!([])), None);
    }
}
