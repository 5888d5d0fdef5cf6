//! Object-diff truncation (spec §4.1)
//!
//! Invoked by callers before enqueuing an [`AuditEvent`](super::event::AuditEvent)
//! that carries a before/after object diff. Caps: 64 KiB overall, 16 KiB per
//! string field. Strategy:
//!
//! 1. If the JSON-marshaled value already fits the overall cap, do nothing.
//! 2. Otherwise walk the tree and replace any string field longer than the
//!    per-field cap with a truncated prefix + sentinel marker, recording its
//!    dotted path. This preserves structure/shape.
//! 3. If the structure-preserving pass still exceeds the overall cap, give
//!    up on structure: flat byte-cut the serialized JSON to the cap with a
//!    marker appended, and flag `structure_preserved = false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_OBJECT_CAP_BYTES: usize = 64 * 1024;
pub const DEFAULT_FIELD_CAP_BYTES: usize = 16 * 1024;

const SENTINEL: &str = "...[truncated]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationResult {
    pub value: Value,
    pub original_size: usize,
    pub truncated_size: usize,
    pub truncated_fields: Vec<String>,
    pub structure_preserved: bool,
}

/// Truncate `value` in place according to the caps, returning the (possibly
/// unmodified) value alongside truncation metadata.
pub fn truncate_object(value: &Value, object_cap: usize, field_cap: usize) -> TruncationResult {
    let original = serde_json::to_string(value).unwrap_or_default();
    let original_size = original.len();

    if original_size <= object_cap {
        return TruncationResult {
            value: value.clone(),
            original_size,
            truncated_size: original_size,
            truncated_fields: Vec::new(),
            structure_preserved: true,
        };
    }

    let mut truncated_fields = Vec::new();
    let mut walked = value.clone();
    truncate_fields(&mut walked, field_cap, "", &mut truncated_fields);

    let walked_str = serde_json::to_string(&walked).unwrap_or_default();
    if walked_str.len() <= object_cap {
        return TruncationResult {
            truncated_size: walked_str.len(),
            value: walked,
            original_size,
            truncated_fields,
            structure_preserved: true,
        };
    }

    // Structure-preserving pass still over budget: flat byte-cut, structure lost.
    let cut_len = object_cap.saturating_sub(SENTINEL.len());
    let mut cut: String = original.chars().take(cut_len).collect();
    cut.push_str(SENTINEL);

    TruncationResult {
        truncated_size: cut.len(),
        value: Value::String(cut),
        original_size,
        truncated_fields,
        structure_preserved: false,
    }
}

fn truncate_fields(value: &mut Value, field_cap: usize, path: &str, truncated: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if s.len() > field_cap {
                let cut_len = field_cap.saturating_sub(SENTINEL.len());
                let mut cut: String = s.chars().take(cut_len).collect();
                cut.push_str(SENTINEL);
                *s = cut;
                truncated.push(path.to_string());
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                let child_path = format!("{path}[{i}]");
                truncate_fields(item, field_cap, &child_path, truncated);
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                truncate_fields(item, field_cap, &child_path, truncated);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_object_untouched() {
        let v = json!({"a": 1, "b": "hello"});
        let r = truncate_object(&v, DEFAULT_OBJECT_CAP_BYTES, DEFAULT_FIELD_CAP_BYTES);
        assert!(r.structure_preserved);
        assert!(r.truncated_fields.is_empty());
        assert_eq!(r.value, v);
    }

    #[test]
    fn oversized_field_is_truncated_with_path_recorded() {
        let big = "x".repeat(20 * 1024);
        let v = json!({"nested": {"blob": big}});
        let r = truncate_object(&v, DEFAULT_OBJECT_CAP_BYTES, DEFAULT_FIELD_CAP_BYTES);
        assert!(r.structure_preserved);
        assert_eq!(r.truncated_fields, vec!["nested.blob".to_string()]);
        let shrunk = r.value["nested"]["blob"].as_str().unwrap();
        assert!(shrunk.len() <= DEFAULT_FIELD_CAP_BYTES);
        assert!(shrunk.ends_with("[truncated]"));
    }

    #[test]
    fn structure_lost_when_still_over_cap_after_field_truncation() {
        // Many distinct fields each under the field cap, but collectively
        // still over the object cap even after (no-op) field truncation.
        let mut obj = serde_json::Map::new();
        for i in 0..100 {
            obj.insert(format!("field_{i}"), json!("y".repeat(1000)));
        }
        let v = Value::Object(obj);
        let r = truncate_object(&v, DEFAULT_OBJECT_CAP_BYTES, DEFAULT_FIELD_CAP_BYTES);
        assert!(!r.structure_preserved);
        assert!(r.truncated_size <= DEFAULT_OBJECT_CAP_BYTES);
        assert!(r.value.is_string());
    }
}
