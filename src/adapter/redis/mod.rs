//! Redis backend: the same cache surface on a native key-value store.
//!
//! Keys are namespaced `table:key`, so clearing a table only touches its own
//! keys. Strings are stored as-is and every other JSON value as its JSON text.
//! Offsets and lengths returned by string commands are redis byte offsets.

mod channels;
mod store;

pub use channels::RedisChannels;
pub use store::RedisStore;

use serde_json::Value;

pub(crate) fn namespaced(table: &str, key: &str) -> String {
    format!("{table}:{key}")
}

pub(crate) fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Inverse of [`encode`]; anything that is not non-string JSON comes back as a string
pub(crate) fn decode(raw: String) -> Value {
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) if !value.is_string() => value,
        _ => Value::String(raw),
    }
}
