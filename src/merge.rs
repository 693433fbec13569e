//! Recursive merge of a partial configuration onto an existing one

use serde_json::{Map, Value};

/// Merge `overlay` onto `base`, returning a new value.
///
/// - Objects merge key by key, recursively.
/// - An array in the overlay is appended to the base's array for that key
///   (a missing or non-array base counts as empty).
/// - Anything else in the overlay replaces the base value.
/// - Keys absent from the overlay keep their base value.
///
/// A non-object overlay, or a non-object base, yields a copy of the overlay.
/// Neither input is modified.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    let (Value::Object(base), Value::Object(overlay)) = (base, overlay) else {
        return overlay.clone();
    };
    Value::Object(merge_maps(base, overlay))
}

fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, value) in overlay {
        let merged = match value {
            Value::Object(_) => {
                let current = result
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                merge(&current, value)
            }
            Value::Array(items) => {
                let mut combined = match result.get(key) {
                    Some(Value::Array(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                combined.extend(items.iter().cloned());
                Value::Array(combined)
            }
            other => other.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preserves_omitted_keys() {
        let base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let overlay = json!({"b": {"c": 9}});
        assert_eq!(merge(&base, &overlay), json!({"a": 1, "b": {"c": 9, "d": 3}}));
    }

    #[test]
    fn test_sequences_are_appended() {
        let base = json!({"x": [1, 2]});
        let overlay = json!({"x": [3]});
        assert_eq!(merge(&base, &overlay), json!({"x": [1, 2, 3]}));
        // inputs untouched
        assert_eq!(base, json!({"x": [1, 2]}));
        assert_eq!(overlay, json!({"x": [3]}));
    }

    #[test]
    fn test_sequence_onto_missing_key() {
        let merged = merge(&json!({}), &json!({"dataVolumes": ["/data:/data"]}));
        assert_eq!(merged, json!({"dataVolumes": ["/data:/data"]}));
    }

    #[test]
    fn test_scalar_overwrite_is_idempotent() {
        let base = json!({"image": "nginx:1.24", "labels": {"tier": "web"}});
        let overlay = json!({"image": "nginx:1.25", "labels": {"tier": "edge"}});
        let once = merge(&base, &overlay);
        assert_eq!(merge(&once, &overlay), once);
    }

    #[test]
    fn test_non_object_overlay_replaces() {
        assert_eq!(merge(&json!({"a": 1}), &json!("flat")), json!("flat"));
        assert_eq!(merge(&json!(null), &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge(&json!([1]), &json!({"a": {"b": 2}})), json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_nested_object_onto_scalar() {
        let base = json!({"environment": "none"});
        let overlay = json!({"environment": {"RUST_LOG": "info"}});
        assert_eq!(merge(&base, &overlay), json!({"environment": {"RUST_LOG": "info"}}));
    }

    #[test]
    fn test_launch_config_upgrade_shape() {
        let current = json!({
            "imageUuid": "docker:registry/app:1",
            "environment": {"DB_HOST": "db", "MODE": "prod"},
            "labels": {"io.rancher.container.pull_image": "always"},
            "dataVolumes": ["/srv/data:/data"]
        });
        let overlay = json!({
            "imageUuid": "docker:registry/app:2",
            "environment": {"MODE": "canary"}
        });

        let merged = merge(&current, &overlay);
        assert_eq!(merged["imageUuid"], "docker:registry/app:2");
        assert_eq!(merged["environment"], json!({"DB_HOST": "db", "MODE": "canary"}));
        assert_eq!(merged["dataVolumes"], json!(["/srv/data:/data"]));
        assert_eq!(merged["labels"]["io.rancher.container.pull_image"], "always");
    }
}
