//! # Canonical JSON
//!
//! Deterministic serialization used for signing: map keys sorted
//! lexicographically at every depth, arrays kept in given order, numbers
//! emitted exactly as JSON renders them, no extraneous whitespace.

use serde_json::Value;

/// Canonical string form of a JSON value.
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// UTF-8 canonical bytes of a value with any top-level `signature` field
/// removed. This is the exact byte string a signature covers.
#[must_use]
pub fn canonical_signing_bytes(value: &Value) -> Vec<u8> {
    match value.as_object() {
        Some(map) if map.contains_key("signature") => {
            let mut stripped = map.clone();
            stripped.remove("signature");
            canonicalize(&Value::Object(stripped)).into_bytes()
        }
        _ => canonicalize(value).into_bytes(),
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                // key came from the map, the entry exists
                if let Some(v) = map.get(*key) {
                    write_value(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
