//! Path operations over a JSON tree.
//!
//! Shared by the in-memory store and by file-backed stores built on it.

use serde_json::{Map, Value};

use super::StoreError;

/// Split `a/b/c` into segments. Leading and trailing slashes are ignored.
pub fn split(path: &str) -> Result<Vec<String>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Value at `segments`, if present.
pub fn get<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// Replace the value at `segments`, creating intermediate objects.
pub fn set(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.clone(), value);
}

/// Remove the value at `segments`, pruning parents left empty.
pub fn remove(root: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let Some(object) = root.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        object.remove(first);
        return;
    }
    if let Some(child) = object.get_mut(first) {
        remove(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            object.remove(first);
        }
    }
}

/// True if `value` contains a `null` anywhere.
pub fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(fields) => fields.values().any(contains_null),
        _ => false,
    }
}

/// True if one path is a prefix of the other (inclusive).
pub fn related(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(path: &str) -> Vec<String> {
        split(path).unwrap()
    }

    #[test]
    fn split_rejects_empty_segments() {
        assert!(split("").is_err());
        assert!(split("/").is_err());
        assert!(split("a//b").is_err());
        assert_eq!(split("/a/b/").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn set_creates_parents() {
        let mut root = json!({});
        set(&mut root, &segs("a/b/c"), json!(1));
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
        assert_eq!(get(&root, &segs("a/b")), Some(&json!({"c": 1})));
    }

    #[test]
    fn set_replaces_scalars_on_the_way() {
        let mut root = json!({"a": 5});
        set(&mut root, &segs("a/b"), json!(true));
        assert_eq!(root, json!({"a": {"b": true}}));
    }

    #[test]
    fn remove_prunes_empty_parents() {
        let mut root = json!({"s": {"x": {"c": {"id": 1}}, "keep": 2}});
        remove(&mut root, &segs("s/x/c/id"));
        assert_eq!(root, json!({"s": {"keep": 2}}));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut root = json!({"a": 1});
        remove(&mut root, &segs("b/c"));
        remove(&mut root, &segs("a/b"));
        assert_eq!(root, json!({"a": 1}));
    }

    #[test]
    fn get_through_scalar_is_none() {
        let root = json!({"a": 1});
        assert_eq!(get(&root, &segs("a/b")), None);
    }

    #[test]
    fn null_detection_is_deep() {
        assert!(contains_null(&json!({"a": [1, {"b": null}]})));
        assert!(!contains_null(&json!({"a": [1, {"b": 2}]})));
    }

    #[test]
    fn related_paths() {
        assert!(related(&segs("a/b"), &segs("a/b/c")));
        assert!(related(&segs("a/b/c"), &segs("a/b")));
        assert!(related(&segs("a"), &segs("a")));
        assert!(!related(&segs("a/b"), &segs("a/c")));
    }
}
