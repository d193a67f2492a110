//! Make host results safe to put on the wire
//!
//! Editor command results are arbitrary structures. Well-known editor shapes
//! (URIs, ranges, positions) are rewritten into tagged records so a client
//! can tell them apart, other objects are copied field by field, and anything
//! nested too deep is stringified.

use serde_json::{Map, Value};

/// Values nested deeper than this are stringified
pub const MAX_DEPTH: usize = 16;

pub const TYPE_KEY: &str = "_type";

/// Keys that carry a type name on objects coming from the host
const TYPE_NAME_KEYS: [&str; 2] = ["$type", "__type"];

pub fn sanitize(value: &Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String(value.to_string());
    }

    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_at(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            if let Some(uri) = uri_string(map) {
                return tagged("Uri", [("value", Value::String(uri))]);
            }
            if let Some((start, end)) = range_bounds(map) {
                return tagged(
                    "Range",
                    [
                        ("start", position_record(start)),
                        ("end", position_record(end)),
                    ],
                );
            }
            if let Some(position) = position(map) {
                return position_record(position);
            }
            copy_object(map, depth)
        }
    }
}

fn copy_object(map: &Map<String, Value>, depth: usize) -> Value {
    let mut out = Map::with_capacity(map.len());

    let type_name = TYPE_NAME_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str));
    if let Some(name) = type_name {
        out.insert(TYPE_KEY.to_string(), Value::String(name.to_string()));
    }

    for (key, value) in map {
        if TYPE_NAME_KEYS.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), sanitize_at(value, depth + 1));
    }
    Value::Object(out)
}

fn tagged<const N: usize>(type_name: &str, fields: [(&str, Value); N]) -> Value {
    let mut out = Map::with_capacity(N + 1);
    out.insert(TYPE_KEY.to_string(), Value::String(type_name.to_string()));
    for (key, value) in fields {
        out.insert(key.to_string(), value);
    }
    Value::Object(out)
}

/// `{scheme, path, authority?, query?, fragment?}` rendered as a URI string
fn uri_string(map: &Map<String, Value>) -> Option<String> {
    let scheme = map.get("scheme")?.as_str()?;
    let path = map.get("path")?.as_str()?;
    if scheme.is_empty() {
        return None;
    }
    let part = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or("");

    let mut uri = format!("{}:", scheme);
    let authority = part("authority");
    if !authority.is_empty() || scheme == "file" {
        uri.push_str("//");
        uri.push_str(authority);
    }
    uri.push_str(path);
    if !part("query").is_empty() {
        uri.push('?');
        uri.push_str(part("query"));
    }
    if !part("fragment").is_empty() {
        uri.push('#');
        uri.push_str(part("fragment"));
    }
    Some(uri)
}

fn range_bounds(map: &Map<String, Value>) -> Option<((u64, u64), (u64, u64))> {
    let start = map.get("start")?.as_object().and_then(position)?;
    let end = map.get("end")?.as_object().and_then(position)?;
    Some((start, end))
}

fn position(map: &Map<String, Value>) -> Option<(u64, u64)> {
    let line = map.get("line")?.as_u64()?;
    let character = map.get("character")?.as_u64()?;
    Some((line, character))
}

fn position_record((line, character): (u64, u64)) -> Value {
    tagged(
        "Position",
        [("line", Value::from(line)), ("character", Value::from(character))],
    )
}
