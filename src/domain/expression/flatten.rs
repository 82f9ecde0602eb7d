//! Flat variable mapping codec
//!
//! A nested JSON value is flattened into path-keyed leaves (`a.b`, `items[0].id`).
//! Arrays are additionally stored whole under their bare key, so a reference to
//! `items` resolves without walking the tree. Empty objects survive as `{}`.
//! Property names containing path syntax are quoted (`['user.name']`).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::workflow::WorkflowError;

use super::path::{index_key, join_key, parse_path, PathSegment};

/// Path-keyed view of a JSON value
pub type FlatMap = BTreeMap<String, Value>;

/// Flatten `value` under `prefix` into a new map
pub fn flatten(prefix: &str, value: &Value) -> FlatMap {
    let mut out = FlatMap::new();
    flatten_into(prefix, value, &mut out);
    out
}

/// Flatten `value` under `prefix`, merging into an existing map
pub fn flatten_into(prefix: &str, value: &Value, out: &mut FlatMap) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(&join_key(prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            out.insert(prefix.to_string(), value.clone());
            for (index, item) in items.iter().enumerate() {
                flatten_into(&index_key(prefix, index), item, out);
            }
        }
        _ => {
            out.insert(prefix.to_string(), value.clone());
        }
    }
}

/// Rebuild a nested value from a flat map
///
/// Shallow keys are applied before deeper ones so leaf entries win over the
/// whole-array copies. Missing array slots are padded with null, but an index
/// may run past the array's current end by at most the number of entries in
/// `flat`; anything further is `IndexOutOfRange`. An empty map yields null.
pub fn unflatten(flat: &FlatMap) -> Result<Value, WorkflowError> {
    let mut entries: Vec<(&str, Vec<PathSegment>, &Value)> = flat
        .iter()
        .map(|(key, value)| (key.as_str(), key_segments(key), value))
        .collect();
    entries.sort_by_key(|(_, segments, _)| segments.len());

    let mut root = Value::Null;
    for (key, segments, value) in entries {
        insert_at(&mut root, &segments, value.clone(), key, flat.len())?;
    }
    Ok(root)
}

/// Rebuild a flat map into an object, treating "nothing" as `{}`
pub fn unflatten_object(flat: &FlatMap) -> Result<Value, WorkflowError> {
    Ok(match unflatten(flat)? {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

/// Keys that do not parse as paths are kept as a single property
fn key_segments(key: &str) -> Vec<PathSegment> {
    match parse_path(key) {
        Ok(segments) if !segments.contains(&PathSegment::Wildcard) => segments,
        _ => vec![PathSegment::Property(key.to_string())],
    }
}

fn insert_at(
    target: &mut Value,
    segments: &[PathSegment],
    value: Value,
    key: &str,
    max_gap: usize,
) -> Result<(), WorkflowError> {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    match first {
        PathSegment::Property(name) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(name.clone()).or_insert(Value::Null);
                insert_at(slot, rest, value, key, max_gap)?;
            }
        }
        PathSegment::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if *index >= items.len() {
                    if *index - items.len() >= max_gap {
                        return Err(WorkflowError::index_out_of_range(
                            key,
                            format!(
                                "index {} is too far past the end of an array of {} items",
                                index,
                                items.len()
                            ),
                        ));
                    }
                    items.resize(*index + 1, Value::Null);
                }
                insert_at(&mut items[*index], rest, value, key, max_gap)?;
            }
        }
        PathSegment::Wildcard => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_object() {
        let flat = flatten("nodeA", &json!({"user": {"name": "Ann", "age": 30}}));

        assert_eq!(flat.get("nodeA.user.name"), Some(&json!("Ann")));
        assert_eq!(flat.get("nodeA.user.age"), Some(&json!(30)));
        assert!(!flat.contains_key("nodeA.user"));
    }

    #[test]
    fn test_flatten_array_keeps_whole_value() {
        let flat = flatten("", &json!({"items": [{"price": 1}, {"price": 2}]}));

        assert_eq!(flat.get("items"), Some(&json!([{"price": 1}, {"price": 2}])));
        assert_eq!(flat.get("items[0].price"), Some(&json!(1)));
        assert_eq!(flat.get("items[1].price"), Some(&json!(2)));
    }

    #[test]
    fn test_flatten_scalar_and_empty_object() {
        assert_eq!(flatten("x", &json!(5)).get("x"), Some(&json!(5)));
        assert_eq!(flatten("", &json!("root")).get(""), Some(&json!("root")));
        assert_eq!(flatten("meta", &json!({})).get("meta"), Some(&json!({})));
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let documents = [
            json!({"a": {"b": [1, {"c": null}], "d": "x"}, "e": true}),
            json!({"items": [[1, 2], [], {"k": {}}], "n": 1.5}),
            json!({"meta": {}, "list": []}),
            json!({"a.b": 1, "c[0]": 2, "": {"it's": [{"x]": null}]}, "plain": {"d.e": "f"}}),
        ];

        for document in documents {
            assert_eq!(unflatten(&flatten("", &document)).unwrap(), document);
        }
    }

    #[test]
    fn test_round_trip_root_array() {
        let document = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(unflatten(&flatten("", &document)).unwrap(), document);
    }

    #[test]
    fn test_unflatten_pads_missing_indices() {
        let mut flat = FlatMap::new();
        flat.insert("list[2]".to_string(), json!("c"));
        flat.insert("list[0]".to_string(), json!("a"));

        assert_eq!(unflatten(&flat).unwrap(), json!({"list": ["a", null, "c"]}));
    }

    #[test]
    fn test_unflatten_rejects_far_indices() {
        for key in ["x[18446744073709551614]", "x[2000000000]", "a.b[5]"] {
            let flat = FlatMap::from([(key.to_string(), json!(1))]);
            let err = unflatten(&flat).unwrap_err();
            assert!(matches!(err, WorkflowError::IndexOutOfRange { .. }), "{}", key);
        }
    }

    #[test]
    fn test_flatten_quotes_keys_with_path_syntax() {
        let flat = flatten("res", &json!({"user.name": "Ann", "x[18446744073709551614]": 1}));

        assert_eq!(flat.get("res['user.name']"), Some(&json!("Ann")));
        assert_eq!(flat.get("res['x[18446744073709551614]']"), Some(&json!(1)));
        assert_eq!(
            unflatten(&flat).unwrap(),
            json!({"res": {"user.name": "Ann", "x[18446744073709551614]": 1}})
        );
    }

    #[test]
    fn test_unflatten_empty_map() {
        assert_eq!(unflatten(&FlatMap::new()).unwrap(), Value::Null);
        assert_eq!(unflatten_object(&FlatMap::new()).unwrap(), json!({}));
    }
}
