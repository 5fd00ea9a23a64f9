//! Cache semantics emulated over a document collection.
//!
//! Each key is one document `{ "_id": key, "value": <json>, "expire_at": <ms>? }`.
//! Expired documents are invisible to reads and evicted lazily before writes
//! touch the same key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::config::Backend;
use crate::core::error::{CacheError, CacheResult};
use crate::core::pattern::KeyPattern;
use crate::core::range;
use crate::core::store::{CacheStore, sort_values};
use crate::driver::{Connection, Document, Filter, ID_FIELD, Page, Update};

const VALUE: &str = "value";
const EXPIRE_AT: &str = "expire_at";

/// Compare-and-swap attempts for `set_range` before giving up
const CAS_RETRIES: usize = 16;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn deadline(ttl: Duration) -> i64 {
    now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn live(key: &str) -> Filter {
    Filter::id(key).and(Filter::Or(vec![
        Filter::Exists(EXPIRE_AT.into(), false),
        Filter::Gt(EXPIRE_AT.into(), now_ms() as f64),
    ]))
}

fn expired(key: &str) -> Filter {
    Filter::id(key).and(Filter::Lte(EXPIRE_AT.into(), now_ms() as f64))
}

fn entry(key: &str, value: Value, ttl: Option<Duration>) -> Document {
    let mut doc = Document::new();
    doc.insert(ID_FIELD.into(), Value::String(key.into()));
    doc.insert(VALUE.into(), value);
    if let Some(ttl) = ttl {
        doc.insert(EXPIRE_AT.into(), json!(deadline(ttl)));
    }
    doc
}

/// String view of a stored value; non-strings use their JSON text
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list_of(key: &str, value: Value) -> CacheResult<Vec<Value>> {
    match value {
        Value::Array(list) => Ok(list),
        other => Err(CacheError::Storage(format!(
            "key '{key}' holds {other}, not a list"
        ))),
    }
}

pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn evict(&self, table: &str, key: &str) -> CacheResult<()> {
        if self.conn.remove(table, &expired(key)).await? > 0 {
            debug!("Evicted expired key '{}' from '{}'", key, table);
        }
        Ok(())
    }

    async fn read(&self, table: &str, key: &str) -> CacheResult<Option<Document>> {
        let mut found = self.conn.find(table, &live(key), Page::ALL).await?;
        Ok(found.pop())
    }

    async fn value(&self, table: &str, key: &str) -> CacheResult<Option<Value>> {
        Ok(self
            .read(table, key)
            .await?
            .and_then(|mut doc| doc.remove(VALUE)))
    }

    /// Atomic read-modify-write on one key, creating it when absent
    async fn modify(&self, table: &str, key: &str, updates: &[Update]) -> CacheResult<Value> {
        self.evict(table, key).await?;
        self.conn
            .find_one_and_update(table, &Filter::id(key), updates, true)
            .await?
            .and_then(|mut doc| doc.remove(VALUE))
            .ok_or_else(|| CacheError::Storage(format!("upsert of '{key}' returned no document")))
    }
}

#[async_trait]
impl CacheStore for DocumentStore {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    async fn open(&self) -> CacheResult<()> {
        self.conn.open().await
    }

    async fn close(&self) -> CacheResult<()> {
        self.conn.close().await
    }

    async fn set(&self, table: &str, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool> {
        let expiry = match ttl {
            Some(ttl) => Update::Set(EXPIRE_AT.into(), json!(deadline(ttl))),
            None => Update::Unset(EXPIRE_AT.into()),
        };
        self.conn
            .update(table, &Filter::id(key), &[Update::Set(VALUE.into(), value), expiry], true)
            .await?;
        Ok(true)
    }

    async fn add(&self, table: &str, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool> {
        self.evict(table, key).await?;
        self.conn.insert_if_absent(table, entry(key, value, ttl)).await
    }

    async fn get(&self, table: &str, key: &str) -> CacheResult<Option<Value>> {
        self.value(table, key).await
    }

    async fn has(&self, table: &str, key: &str) -> CacheResult<bool> {
        Ok(self.read(table, key).await?.is_some())
    }

    async fn del(&self, table: &str, key: &str) -> CacheResult<bool> {
        self.evict(table, key).await?;
        Ok(self.conn.remove(table, &Filter::id(key)).await? > 0)
    }

    async fn expire(&self, table: &str, key: &str, ttl: Duration) -> CacheResult<bool> {
        let outcome = self
            .conn
            .update(table, &live(key), &[Update::Set(EXPIRE_AT.into(), json!(deadline(ttl)))], false)
            .await?;
        Ok(outcome.matched > 0)
    }

    async fn incr(&self, table: &str, key: &str, delta: i64) -> CacheResult<i64> {
        let value = self.modify(table, key, &[Update::IncInt(VALUE.into(), delta)]).await?;
        value
            .as_i64()
            .ok_or_else(|| CacheError::Storage(format!("key '{key}' holds {value}, not an integer")))
    }

    async fn incr_float(&self, table: &str, key: &str, delta: f64) -> CacheResult<f64> {
        let value = self.modify(table, key, &[Update::Inc(VALUE.into(), json!(delta))]).await?;
        value
            .as_f64()
            .ok_or_else(|| CacheError::Storage(format!("key '{key}' holds {value}, not a number")))
    }

    async fn append(&self, table: &str, key: &str, suffix: &str) -> CacheResult<usize> {
        let value = self
            .modify(table, key, &[Update::Append(VALUE.into(), suffix.to_string())])
            .await?;
        Ok(text_of(&value).chars().count())
    }

    async fn get_range(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<String> {
        Ok(match self.value(table, key).await? {
            Some(value) => range::substr(&text_of(&value), start, end),
            None => String::new(),
        })
    }

    async fn set_range(&self, table: &str, key: &str, index: usize, value: &str) -> CacheResult<usize> {
        if !range::fits(index, value) {
            return Err(CacheError::invalid(format!(
                "setrange offset {index} exceeds {} bytes",
                range::MAX_STRING_LEN
            )));
        }
        self.evict(table, key).await?;

        for _ in 0..CAS_RETRIES {
            match self.value(table, key).await? {
                None => {
                    let next = range::overwrite("", index, value);
                    let len = next.chars().count();
                    if self.conn.insert_if_absent(table, entry(key, json!(next), None)).await? {
                        return Ok(len);
                    }
                }
                Some(current) => {
                    let next = range::overwrite(&text_of(&current), index, value);
                    let len = next.chars().count();
                    let guard = Filter::id(key).and(Filter::Eq(VALUE.into(), current));
                    let outcome = self
                        .conn
                        .update(table, &guard, &[Update::Set(VALUE.into(), json!(next))], false)
                        .await?;
                    if outcome.matched > 0 {
                        return Ok(len);
                    }
                }
            }
            debug!("setrange on '{}' lost a race, retrying", key);
        }

        warn!("setrange on '{}' gave up after {} attempts", key, CAS_RETRIES);
        Err(CacheError::Storage(format!(
            "setrange on '{key}' kept conflicting with concurrent writers"
        )))
    }

    async fn clear(&self, table: &str) -> CacheResult<u64> {
        self.conn.remove(table, &Filter::All).await
    }

    async fn sort(&self, table: &str, key: &str) -> CacheResult<Vec<Value>> {
        let Some(value) = self.value(table, key).await? else {
            return Ok(Vec::new());
        };
        let mut members = list_of(key, value)?;
        sort_values(&mut members);
        Ok(members)
    }

    async fn keys(&self, table: &str, pattern: &KeyPattern) -> CacheResult<Vec<String>> {
        let re = pattern.to_regex().map_err(CacheError::storage)?;
        let filter = Filter::Regex(ID_FIELD.into(), re).and(Filter::Or(vec![
            Filter::Exists(EXPIRE_AT.into(), false),
            Filter::Gt(EXPIRE_AT.into(), now_ms() as f64),
        ]));

        let mut keys: Vec<String> = self
            .conn
            .find(table, &filter, Page::ALL)
            .await?
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).and_then(Value::as_str).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn list_push(&self, table: &str, key: &str, values: Vec<Value>) -> CacheResult<usize> {
        let value = self.modify(table, key, &[Update::Push(VALUE.into(), values)]).await?;
        Ok(list_of(key, value)?.len())
    }

    async fn list_range(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<Vec<Value>> {
        let Some(value) = self.value(table, key).await? else {
            return Ok(Vec::new());
        };
        let list = list_of(key, value)?;
        Ok(match range::resolve(list.len(), start, end) {
            Some(window) => list[window].to_vec(),
            None => Vec::new(),
        })
    }

    async fn list_trim(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<()> {
        self.evict(table, key).await?;
        let trimmed = self
            .conn
            .find_one_and_update(table, &Filter::id(key), &[Update::Slice(VALUE.into(), start, end)], false)
            .await?;

        let emptied = trimmed
            .as_ref()
            .and_then(|doc| doc.get(VALUE))
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty);
        if emptied {
            let guard = Filter::id(key).and(Filter::Eq(VALUE.into(), json!([])));
            self.conn.remove(table, &guard).await?;
        }
        Ok(())
    }

    async fn purge_expired(&self, table: &str) -> CacheResult<u64> {
        let removed = self
            .conn
            .remove(table, &Filter::Lte(EXPIRE_AT.into(), now_ms() as f64))
            .await?;
        if removed > 0 {
            debug!("Purged {} expired entries from '{}'", removed, table);
        }
        Ok(removed)
    }
}
