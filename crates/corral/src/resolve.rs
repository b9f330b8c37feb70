//! Resource field detection and resolution.
//!
//! An app's output schema may flag fields as deferred resources: the call
//! result then carries a resource id (`reid`) where the payload belongs, and
//! the payload has to be fetched separately from the app's resource
//! endpoint.
//!
//! Detection ([`has_resource_fields`]) is a pure structural predicate over
//! the untyped schema document. Substitution ([`resolve`]) walks the schema
//! and the result in parallel; each flagged path is dereferenced with a
//! follow-up fetch and replaced in place. A failed path is left unresolved
//! and recorded in the [`Resolution`] outcome; the rest of the result is
//! still returned.
//!
//! ## Substitution rule
//!
//! The flagged schema node maps to a result location as follows:
//! `"properties"` descends into the named result field, `"items"` descends
//! into each element of a result array, and every other object-valued key
//! mirrors a result field directly, so detection and path collection agree
//! on which nodes count as flagged. The result value at a flagged
//! location must be a string `reid`. The dereferenced payload replaces it as
//! parsed JSON when the bytes parse, else as a base64 string.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::warn;

use crate::fetch::Fetcher;

/// Outcome of a resolution pass, for asserting in tests and deciding how
/// loudly to log - not an error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every flagged path was dereferenced (or nothing needed to be).
    Clean,
    /// The schema flags no resource fields; the result passed through.
    NoResources,
    /// Some paths failed to dereference and were left as their reids.
    Partial { failed: Vec<String> },
}

/// Does this schema node flag any field as a deferred resource?
///
/// Pure function of the schema: an object with a truthy `"resource"` key is
/// flagged; otherwise every object or array value is searched recursively,
/// short-circuiting on the first match.
pub fn has_resource_fields(node: &Value) -> bool {
    match node {
        Value::Object(map) => {
            if map.get("resource").is_some_and(truthy) {
                return true;
            }
            map.values().any(|v| {
                matches!(v, Value::Object(_) | Value::Array(_)) && has_resource_fields(v)
            })
        }
        Value::Array(items) => items.iter().any(has_resource_fields),
        _ => false,
    }
}

/// Schemas mark truthiness loosely; mirror the usual duck rules.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// One step from a schema node towards the matching result location.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Descend into a named field.
    Field(String),
    /// Descend into every element of an array.
    Each,
}

/// Collect the schema paths of every resource-flagged node.
fn resource_paths(schema: &Value) -> Vec<Vec<Step>> {
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    walk(schema, &mut prefix, &mut out);
    out
}

fn walk(node: &Value, prefix: &mut Vec<Step>, out: &mut Vec<Vec<Step>>) {
    match node {
        Value::Object(map) => {
            if map.get("resource").is_some_and(truthy) {
                out.push(prefix.clone());
                return;
            }
            if let Some(props) = map.get("properties").and_then(Value::as_object) {
                for (name, child) in props {
                    prefix.push(Step::Field(name.clone()));
                    walk(child, prefix, out);
                    prefix.pop();
                }
            }
            if let Some(items) = map.get("items") {
                prefix.push(Step::Each);
                walk(items, prefix, out);
                prefix.pop();
            }
            // Plain nesting: every other key mirrors a result field
            // directly, keeping the walk in step with has_resource_fields
            for (name, child) in map {
                if name == "properties" || name == "items" {
                    continue;
                }
                if matches!(child, Value::Object(_) | Value::Array(_)) {
                    prefix.push(Step::Field(name.clone()));
                    walk(child, prefix, out);
                    prefix.pop();
                }
            }
        }
        Value::Array(items) => {
            // A bare schema array describes each result element by its first
            // entry
            if let Some(first) = items.first() {
                prefix.push(Step::Each);
                walk(first, prefix, out);
                prefix.pop();
            }
        }
        _ => {}
    }
}

/// Expand one schema path against a concrete result into JSON pointers.
///
/// `Each` steps fan out across the actual array; paths the result doesn't
/// carry simply produce no pointers.
fn concrete_pointers(result: &Value, path: &[Step]) -> Vec<String> {
    let mut out = Vec::new();
    expand(result, path, String::new(), &mut out);
    out
}

fn expand(value: &Value, path: &[Step], pointer: String, out: &mut Vec<String>) {
    match path.split_first() {
        None => out.push(pointer),
        Some((Step::Field(name), rest)) => {
            if let Some(child) = value.as_object().and_then(|m| m.get(name)) {
                let pointer = format!("{}/{}", pointer, escape_pointer(name));
                expand(child, rest, pointer, out);
            }
        }
        Some((Step::Each, rest)) => {
            if let Some(items) = value.as_array() {
                for (i, child) in items.iter().enumerate() {
                    expand(child, rest, format!("{}/{}", pointer, i), out);
                }
            }
        }
    }
}

/// RFC 6901 escaping for pointer segments.
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Dereference every schema-flagged resource field in `result`.
///
/// Non-fatal by design: a path that fails (missing reid, fetch failure) is
/// left holding its reid, recorded in the outcome, and logged; every other
/// path is still resolved.
pub async fn resolve(
    fetcher: &Fetcher,
    app_id: &str,
    mut result: Value,
    schema: &Value,
) -> (Value, Resolution) {
    let paths = resource_paths(schema);
    if paths.is_empty() {
        return (result, Resolution::NoResources);
    }

    let mut pointers: Vec<String> = paths
        .iter()
        .flat_map(|path| concrete_pointers(&result, path))
        .collect();
    pointers.sort();
    pointers.dedup();

    let mut failed = Vec::new();
    for pointer in pointers {
        let reid = match result.pointer(&pointer).and_then(Value::as_str) {
            Some(reid) if !reid.is_empty() => reid.to_string(),
            _ => {
                warn!(app_id = %app_id, path = %pointer, "flagged field holds no resource id");
                failed.push(pointer);
                continue;
            }
        };

        match fetcher.resource(app_id, &reid).await {
            Ok(bytes) => {
                let payload = match serde_json::from_slice::<Value>(&bytes) {
                    Ok(parsed) => parsed,
                    Err(_) => Value::String(BASE64.encode(&bytes)),
                };
                if let Some(slot) = result.pointer_mut(&pointer) {
                    *slot = payload;
                }
            }
            Err(e) => {
                warn!(app_id = %app_id, path = %pointer, reid = %reid, error = %e,
                      "resource dereference failed, leaving field unresolved");
                failed.push(pointer);
            }
        }
    }

    if failed.is_empty() {
        (result, Resolution::Clean)
    } else {
        (result, Resolution::Partial { failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_truthy_resource_flag() {
        assert!(has_resource_fields(&json!({"a": {"resource": true}})));
        assert!(!has_resource_fields(&json!({"a": {"resource": false}})));
        assert!(!has_resource_fields(&json!({"a": 1})));
    }

    #[test]
    fn test_detects_flag_in_arrays() {
        assert!(has_resource_fields(&json!([{"resource": true}])));
        assert!(!has_resource_fields(&json!([])));
        assert!(!has_resource_fields(&json!([1, "two", null])));
    }

    #[test]
    fn test_detects_deep_nesting() {
        let schema = json!({
            "a": {"b": [{"c": {"resource": "yes"}}]},
            "d": "scalar",
        });
        assert!(has_resource_fields(&schema));
    }

    #[test]
    fn test_falsey_flag_values() {
        for flag in [json!(null), json!(0), json!(""), json!([]), json!({})] {
            assert!(
                !has_resource_fields(&json!({"a": {"resource": flag}})),
                "{:?} should be falsey",
                flag
            );
        }
    }

    #[test]
    fn test_top_level_flag() {
        assert!(has_resource_fields(&json!({"resource": true})));
        assert!(!has_resource_fields(&json!("resource")));
        assert!(!has_resource_fields(&json!(42)));
    }

    #[test]
    fn test_paths_through_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "image": {"type": "string", "resource": true},
                "caption": {"type": "string"},
            }
        });
        let paths = resource_paths(&schema);
        assert_eq!(paths, vec![vec![Step::Field("image".to_string())]]);
    }

    #[test]
    fn test_paths_through_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "frames": {
                    "type": "array",
                    "items": {"type": "string", "resource": true},
                }
            }
        });
        let paths = resource_paths(&schema);
        assert_eq!(
            paths,
            vec![vec![Step::Field("frames".to_string()), Step::Each]]
        );
    }

    #[test]
    fn test_paths_plain_nesting() {
        let schema = json!({"result": {"model": {"resource": true}}});
        let paths = resource_paths(&schema);
        assert_eq!(
            paths,
            vec![vec![
                Step::Field("result".to_string()),
                Step::Field("model".to_string())
            ]]
        );
    }

    #[test]
    fn test_paths_cover_siblings_of_properties() {
        // A flagged node under a sibling of "properties" is still reachable,
        // matching what has_resource_fields reports
        let schema = json!({
            "properties": {"caption": {"type": "string"}},
            "definitions": {"thumb": {"resource": true}},
        });
        assert!(has_resource_fields(&schema));
        let paths = resource_paths(&schema);
        assert_eq!(
            paths,
            vec![vec![
                Step::Field("definitions".to_string()),
                Step::Field("thumb".to_string())
            ]]
        );
    }

    #[test]
    fn test_concrete_pointers_fan_out() {
        let path = vec![Step::Field("frames".to_string()), Step::Each];
        let result = json!({"frames": ["res-1", "res-2", "res-3"]});
        assert_eq!(
            concrete_pointers(&result, &path),
            vec!["/frames/0", "/frames/1", "/frames/2"]
        );
    }

    #[test]
    fn test_concrete_pointers_missing_field() {
        let path = vec![Step::Field("image".to_string())];
        let result = json!({"caption": "no image here"});
        assert!(concrete_pointers(&result, &path).is_empty());
    }

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(escape_pointer("a/b"), "a~1b");
        assert_eq!(escape_pointer("a~b"), "a~0b");

        let path = vec![Step::Field("a/b".to_string())];
        let result = json!({"a/b": "res-1"});
        let pointers = concrete_pointers(&result, &path);
        assert_eq!(pointers, vec!["/a~1b"]);
        assert_eq!(result.pointer(&pointers[0]), Some(&json!("res-1")));
    }
}
