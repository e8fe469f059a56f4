//! Dotted-path lookup over JSON values
//!
//! Paths like `order.items.0.price` walk objects by key and arrays by
//! integer index. Lookups never fail: any missing key, bad index or type
//! mismatch yields the caller's default.

use serde_json::{Map, Value};

/// Resolve `path` against `data`, returning `default` if any segment fails.
pub fn get_var(data: &Value, path: &str, default: Value) -> Value {
    lookup(data, path).cloned().unwrap_or(default)
}

/// Resolve `path` against `data` by reference.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, step)
}

/// Resolve `path` against a top-level object.
pub fn lookup_in<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = split_head(path);
    let first = data.get(head)?;
    match rest {
        Some(rest) => lookup(first, rest),
        None => Some(first),
    }
}

/// Write `value` at `path` inside `data`.
///
/// Missing intermediate levels are created as objects; an intermediate
/// that is not an object is replaced by one.
pub fn set_var(data: &mut Map<String, Value>, path: &str, value: Value) {
    let (head, rest) = split_head(path);
    let Some(rest) = rest else {
        data.insert(head.to_string(), value);
        return;
    };

    let slot = data
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(inner) = slot {
        set_var(inner, rest, value);
    }
}

/// Split off the first segment of a path.
pub fn split_head(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

fn step<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
