//! Reconciles the shapes a tool result can take into a flat list of records.
//!
//! The same IAM query comes back as `[{"Users": [...]}]`, `{"users": [...]}`,
//! a bare list of records, or a single record depending on server version.

use serde_json::{Map, Value};

/// Fields whose presence marks an object as an identity record.
pub const IDENTITY_FIELDS: [&str; 6] = ["UserName", "RoleName", "GroupName", "Arn", "UserId", "RoleId"];

/// Top-level shape of a raw tool result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultShape<'a> {
    Absent,
    List(&'a [Value]),
    Object(&'a Map<String, Value>),
    Primitive(&'a Value),
}

impl<'a> ResultShape<'a> {
    /// Falsy values (`null`, `false`, `0`, `""`, `[]`, `{}`) are `Absent`.
    pub fn of(value: &'a Value) -> Self {
        if is_falsy(value) {
            return ResultShape::Absent;
        }
        match value {
            Value::Array(items) => ResultShape::List(items),
            Value::Object(map) => ResultShape::Object(map),
            other => ResultShape::Primitive(other),
        }
    }
}

pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

pub fn is_identity_shaped(record: &Map<String, Value>) -> bool {
    IDENTITY_FIELDS.iter().any(|f| record.contains_key(*f))
}

/// Extract the records stored under `key` (e.g. `"Users"`).
///
/// Rules, first match wins:
/// 1. falsy input gives nothing;
/// 2. a list whose first element holds `key` (exact, then lowercased)
///    gives that value, otherwise the list itself;
/// 3. an object holding `key` (exact, then lowercased) gives that value,
///    an identity-shaped object gives itself, anything else nothing;
/// 4. primitives give nothing.
pub fn normalize_collection(raw: &Value, key: &str) -> Vec<Value> {
    match ResultShape::of(raw) {
        ResultShape::Absent | ResultShape::Primitive(_) => Vec::new(),
        ResultShape::List(items) => match items.first().and_then(Value::as_object) {
            Some(first) => match lookup_key(first, key) {
                Some(v) => flatten(v),
                None => items.to_vec(),
            },
            None => items.to_vec(),
        },
        ResultShape::Object(map) => match lookup_key(map, key) {
            Some(v) => flatten(v),
            None if is_identity_shaped(map) => vec![Value::Object(map.clone())],
            None => Vec::new(),
        },
    }
}

/// Like [`normalize_collection`] for a keyed field whose value is wanted as
/// an object (e.g. `LoginProfile`). Falls back to the input object itself.
pub fn unwrap_object(raw: &Value, keys: &[&str]) -> Map<String, Value> {
    let Some(map) = raw.as_object() else {
        return Map::new();
    };
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_object))
        .unwrap_or(map)
        .clone()
}

/// Values stored under the first of `keys` present in `raw`, when `raw` is an
/// object; `raw` itself when it is a list.
pub fn unwrap_list(raw: &Value, keys: &[&str]) -> Vec<Value> {
    match raw {
        Value::Array(items) => items.clone(),
        Value::Object(map) => keys
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn lookup_key<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| map.get(&key.to_lowercase()))
}

fn flatten(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![value.clone()],
        _ => Vec::new(),
    }
}
