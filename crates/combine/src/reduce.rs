//! A single reduction strategy: deep-merge objects, last-write-wins
//! everywhere else. The production `doc::reduce::Strategy` enum (append,
//! first/last-write-wins, maximize, merge, minimize, set) is selected
//! per-location from JSON-Schema annotations; picking a strategy per
//! location requires the schema machinery this crate intentionally
//! leaves out, so every location here reduces with the same rule.

use serde_json::Value;

/// Reduce `rhs` onto `lhs`, where `lhs` is `None` for a location's first
/// occurrence. Objects are merged key-by-key, recursively; any other pair
/// of values (including a type mismatch) resolves to `rhs`.
pub fn merge(lhs: Option<Value>, rhs: Value) -> Value {
    match lhs {
        None => rhs,
        Some(lhs) => merge_values(lhs, rhs),
    }
}

fn merge_values(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Object(mut lhs), Value::Object(rhs)) => {
            for (key, rhs_value) in rhs {
                let merged = match lhs.remove(&key) {
                    Some(lhs_value) => merge_values(lhs_value, rhs_value),
                    None => rhs_value,
                };
                lhs.insert(key, merged);
            }
            Value::Object(lhs)
        }
        (_, rhs) => rhs,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_occurrence_passes_through() {
        let doc = json!({"a": 1});
        assert_eq!(merge(None, doc.clone()), doc);
    }

    #[test]
    fn test_objects_merge_recursively() {
        let lhs = json!({"a": {"x": 1, "y": 2}, "b": 1});
        let rhs = json!({"a": {"y": 3, "z": 4}, "c": 2});
        assert_eq!(
            merge(Some(lhs), rhs),
            json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1, "c": 2})
        );
    }

    #[test]
    fn test_non_object_is_last_write_wins() {
        assert_eq!(merge(Some(json!(1)), json!(2)), json!(2));
        assert_eq!(merge(Some(json!([1, 2])), json!([3])), json!([3]));
    }

    #[test]
    fn test_type_mismatch_prefers_rhs() {
        assert_eq!(merge(Some(json!({"a": 1})), json!("replaced")), json!("replaced"));
    }
}
