use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::config::Backend;
use super::error::CacheResult;
use super::pattern::KeyPattern;

/// Cache-shaped storage backend.
///
/// Every operation names its table explicitly; backends keep no "current
/// table" state, so concurrent callers on different tables never interfere.
/// Ranges are inclusive and accept negative indices counted from the end.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    fn backend(&self) -> Backend;

    /// Establish the backend connection; calling it again is a no-op
    async fn open(&self) -> CacheResult<()>;

    async fn close(&self) -> CacheResult<()>;

    /// Unconditional write; `None` ttl clears any previous expiry
    async fn set(&self, table: &str, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Write only if the key is absent; `false` when a live entry already exists
    async fn add(&self, table: &str, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool>;

    async fn get(&self, table: &str, key: &str) -> CacheResult<Option<Value>>;

    async fn has(&self, table: &str, key: &str) -> CacheResult<bool>;

    async fn del(&self, table: &str, key: &str) -> CacheResult<bool>;

    /// Reset the expiry of an existing entry
    async fn expire(&self, table: &str, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Add `delta` (may be negative) to an integer entry, starting from 0
    async fn incr(&self, table: &str, key: &str, delta: i64) -> CacheResult<i64>;

    async fn incr_float(&self, table: &str, key: &str, delta: f64) -> CacheResult<f64>;

    /// Append to a string entry, returning the new length
    async fn append(&self, table: &str, key: &str, suffix: &str) -> CacheResult<usize>;

    async fn get_range(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<String>;

    async fn set_range(&self, table: &str, key: &str, index: usize, value: &str) -> CacheResult<usize>;

    /// Drop every entry of `table`
    async fn clear(&self, table: &str) -> CacheResult<u64>;

    /// Members of a list entry, numbers first in numeric order
    async fn sort(&self, table: &str, key: &str) -> CacheResult<Vec<Value>>;

    /// Matching keys in ascending order
    async fn keys(&self, table: &str, pattern: &KeyPattern) -> CacheResult<Vec<String>>;

    async fn list_push(&self, table: &str, key: &str, values: Vec<Value>) -> CacheResult<usize>;

    async fn list_range(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<Vec<Value>>;

    /// Keep only the `[start, end]` window; an empty result removes the key
    async fn list_trim(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<()>;

    /// Physically remove expired entries, for backends without native expiry
    async fn purge_expired(&self, _table: &str) -> CacheResult<u64> {
        Ok(0)
    }
}

/// Ordering used by `sort`: numbers ascending, then strings, then everything
/// else by its JSON text
pub(crate) fn sort_values(values: &mut [Value]) {
    use std::cmp::Ordering;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            _ => 2,
        }
    }

    values.sort_by(|a, b| match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    });
}
