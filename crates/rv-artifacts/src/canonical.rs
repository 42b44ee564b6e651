use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Sort object keys recursively. Arrays keep their order.
pub fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Compact canonical JSON: keys sorted at every depth, no whitespace.
pub fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize for canonical json failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("canonical json stringify failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_key_order_is_irrelevant() {
        let a = json!({"b": 1, "a": {"y": [3, {"d": 1, "c": 2}], "x": null}});
        let b = json!({"a": {"x": null, "y": [3, {"c": 2, "d": 1}]}, "b": 1});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(
            canonical_json(&a).unwrap(),
            r#"{"a":{"x":null,"y":[3,{"c":2,"d":1}]},"b":1}"#
        );
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(
            canonical_json(&json!([1, 2])).unwrap(),
            canonical_json(&json!([2, 1])).unwrap()
        );
    }
}
