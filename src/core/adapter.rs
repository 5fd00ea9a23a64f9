use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::channel::{ChannelDispatcher, InboundMessage};
use super::config::{Backend, CacheConfig};
use super::error::{CacheError, CacheResult};
use super::handler::{ChannelHandler, DefaultHandler};
use super::pattern::KeyPattern;
use super::range;
use super::store::CacheStore;
use crate::adapter::document::DocumentStore;
use crate::adapter::local::{LocalChannels, LocalHub};
use crate::adapter::redis::{RedisChannels, RedisStore};
use crate::driver::{Connection, Driver};

/// Inbound queue depth between a transport and its dispatcher
const INBOUND_CAPACITY: usize = 256;

fn require_key(op: &str, key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::invalid(format!("{op}: key must not be empty")));
    }
    Ok(())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Cache operations for one scope, backed by one storage connection.
///
/// Plain methods work on the configured default table; use
/// [`table`](Self::table) to address another one.
pub struct CacheAdapter {
    scope: String,
    dir: Option<PathBuf>,
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    channels: Arc<ChannelDispatcher>,
}

impl CacheAdapter {
    pub fn new(
        scope: impl Into<String>,
        dir: Option<PathBuf>,
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        channels: Arc<ChannelDispatcher>,
    ) -> Self {
        Self {
            scope: scope.into(),
            dir,
            config,
            store,
            channels,
        }
    }

    /// Document-store backend with in-process channels on `hub`
    pub fn document(
        scope: impl Into<String>,
        dir: Option<PathBuf>,
        config: CacheConfig,
        driver: Arc<dyn Driver>,
        hub: &LocalHub,
    ) -> Self {
        let store = Arc::new(DocumentStore::new(Connection::new(config.clone(), driver)));
        let (tx, rx) = mpsc::channel::<InboundMessage>(INBOUND_CAPACITY);
        let channels = ChannelDispatcher::new(Arc::new(LocalChannels::new(hub, tx)), rx);
        Self::new(scope, dir, config, store, channels)
    }

    /// Redis backend; channels use redis pub/sub on the same server
    pub fn redis(scope: impl Into<String>, dir: Option<PathBuf>, config: CacheConfig) -> Self {
        let store = Arc::new(RedisStore::new(config.clone()));
        let (tx, rx) = mpsc::channel::<InboundMessage>(INBOUND_CAPACITY);
        let channels = ChannelDispatcher::new(Arc::new(RedisChannels::new(store.clone(), tx)), rx);
        Self::new(scope, dir, config, store, channels)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn channels(&self) -> &Arc<ChannelDispatcher> {
        &self.channels
    }

    /// Read a config file, resolving relative paths against this adapter's directory
    pub fn load_config(&self, file: impl AsRef<Path>) -> CacheResult<CacheConfig> {
        let file = file.as_ref();
        let path = match &self.dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.to_path_buf(),
        };
        debug!("Scope '{}' loading config from {}", self.scope, path.display());
        CacheConfig::from_file(path)
    }

    pub async fn open(&self) -> CacheResult<()> {
        self.store.open().await
    }

    /// Drop subscriptions and release the storage connection
    pub async fn close(&self) -> CacheResult<()> {
        self.channels.close().await?;
        self.store.close().await
    }

    pub fn table(&self, name: impl Into<String>) -> TableCache<'_> {
        TableCache {
            store: self.store.as_ref(),
            name: name.into(),
        }
    }

    pub fn default_table(&self) -> TableCache<'_> {
        self.table(self.config.table.clone())
    }

    // ========================================================================
    // Default-table shorthands
    // ========================================================================

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// The redis backend keeps strings as raw text, so a string that reads as
    /// another JSON value (`"42"`, `"true"`) comes back from [`get`](Self::get)
    /// as that value. The document backend returns exactly what was stored.
    pub async fn set(&self, key: &str, value: impl Into<Value>, ttl: Option<Duration>) -> CacheResult<bool> {
        self.default_table().set(key, value, ttl).await
    }

    pub async fn add(&self, key: &str, value: impl Into<Value>, ttl: Option<Duration>) -> CacheResult<bool> {
        self.default_table().add(key, value, ttl).await
    }

    /// Live value of `key`.
    ///
    /// On redis, stored text is decoded as JSON when it parses, so a string
    /// set as `"42"` reads back as the number `42`.
    pub async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.default_table().get(key).await
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.default_table().has(key).await
    }

    pub async fn del(&self, key: &str) -> CacheResult<bool> {
        self.default_table().del(key).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.default_table().expire(key, ttl).await
    }

    pub async fn add_int(&self, key: &str, n: i64) -> CacheResult<i64> {
        self.default_table().add_int(key, n).await
    }

    pub async fn add_float(&self, key: &str, n: f64) -> CacheResult<f64> {
        self.default_table().add_float(key, n).await
    }

    pub async fn add_str(&self, key: &str, s: &str) -> CacheResult<usize> {
        self.default_table().add_str(key, s).await
    }

    pub async fn getrange(&self, key: &str, start: i64, end: i64) -> CacheResult<String> {
        self.default_table().getrange(key, start, end).await
    }

    pub async fn setrange(&self, key: &str, index: usize, value: &str) -> CacheResult<usize> {
        self.default_table().setrange(key, index, value).await
    }

    pub async fn clear(&self, key: Option<&str>) -> CacheResult<u64> {
        self.default_table().clear(key).await
    }

    pub async fn sort(&self, key: &str) -> CacheResult<Vec<Value>> {
        self.default_table().sort(key).await
    }

    pub async fn keys(&self, pattern: Option<&str>) -> CacheResult<Vec<String>> {
        self.default_table().keys(pattern).await
    }

    pub async fn purge_expired(&self) -> CacheResult<u64> {
        self.default_table().purge_expired().await
    }

    pub async fn list_push(&self, key: &str, value: impl Into<Value>) -> CacheResult<usize> {
        self.default_table().list_push(key, value).await
    }

    pub async fn list_push_many(&self, key: &str, values: Vec<Value>) -> CacheResult<usize> {
        self.default_table().list_push_many(key, values).await
    }

    pub async fn list_set(&self, key: &str, value: impl Into<Value>, ttl: Option<Duration>) -> CacheResult<usize> {
        self.default_table().list_set(key, value, ttl).await
    }

    pub async fn list_get(&self, key: &str, start: i64, end: i64) -> CacheResult<Vec<Value>> {
        self.default_table().list_get(key, start, end).await
    }

    pub async fn list_all(&self, key: &str) -> CacheResult<Vec<Value>> {
        self.default_table().list_all(key).await
    }

    pub async fn list_has(&self, key: &str, value: &Value) -> CacheResult<bool> {
        self.default_table().list_has(key, value).await
    }

    pub async fn list_clear(&self, key: &str, members: Option<Vec<Value>>) -> CacheResult<()> {
        self.default_table().list_clear(key, members).await
    }

    // ========================================================================
    // Channels
    // ========================================================================

    pub async fn subscribe(&self, channel: &str, handler: Option<Arc<dyn ChannelHandler>>) -> CacheResult<()> {
        self.channels.subscribe(channel, handler).await
    }

    pub async fn subscribe_with<H: ChannelHandler>(&self, channel: &str, handler: H) -> CacheResult<()> {
        self.channels.subscribe_with(channel, handler).await
    }

    pub async fn unsubscribe(&self, channel: &str) -> CacheResult<()> {
        self.channels.unsubscribe(channel).await
    }

    pub async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        self.channels.publish(channel, message).await
    }

    pub fn set_default_handler<H: DefaultHandler>(&self, handler: H) {
        self.channels.set_default_handler(handler);
    }
}

/// Cache operations bound to one table
pub struct TableCache<'a> {
    store: &'a dyn CacheStore,
    name: String,
}

impl TableCache<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn set(&self, key: &str, value: impl Into<Value>, ttl: Option<Duration>) -> CacheResult<bool> {
        self.store.set(&self.name, key, value.into(), ttl).await
    }

    /// Insert-if-absent; never overwrites a live entry
    pub async fn add(&self, key: &str, value: impl Into<Value>, ttl: Option<Duration>) -> CacheResult<bool> {
        self.store.add(&self.name, key, value.into(), ttl).await
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.store.get(&self.name, key).await
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.store.has(&self.name, key).await
    }

    pub async fn del(&self, key: &str) -> CacheResult<bool> {
        require_key("del", key)?;
        self.store.del(&self.name, key).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.store.expire(&self.name, key, ttl).await
    }

    /// Increment by `n`, or decrement by `-n` when `n` is not positive
    pub async fn add_int(&self, key: &str, n: i64) -> CacheResult<i64> {
        self.store.incr(&self.name, key, n).await
    }

    pub async fn add_float(&self, key: &str, n: f64) -> CacheResult<f64> {
        self.store.incr_float(&self.name, key, n).await
    }

    pub async fn add_str(&self, key: &str, s: &str) -> CacheResult<usize> {
        self.store.append(&self.name, key, s).await
    }

    pub async fn getrange(&self, key: &str, start: i64, end: i64) -> CacheResult<String> {
        self.store.get_range(&self.name, key, start, end).await
    }

    /// Overwrite from `index`, padding with NULs; the result may not exceed 512 MiB
    pub async fn setrange(&self, key: &str, index: usize, value: &str) -> CacheResult<usize> {
        if !range::fits(index, value) {
            return Err(CacheError::invalid(format!(
                "setrange: offset {index} exceeds {} bytes",
                range::MAX_STRING_LEN
            )));
        }
        self.store.set_range(&self.name, key, index, value).await
    }

    /// Delete one key, or the whole table when `key` is `None`
    pub async fn clear(&self, key: Option<&str>) -> CacheResult<u64> {
        match key {
            Some(key) => {
                require_key("clear", key)?;
                Ok(u64::from(self.store.del(&self.name, key).await?))
            }
            None => self.store.clear(&self.name).await,
        }
    }

    pub async fn sort(&self, key: &str) -> CacheResult<Vec<Value>> {
        self.store.sort(&self.name, key).await
    }

    /// Keys matching a `*` pattern (`None` means every key)
    pub async fn keys(&self, pattern: Option<&str>) -> CacheResult<Vec<String>> {
        let pattern = KeyPattern::parse(pattern.unwrap_or("*"));
        self.store.keys(&self.name, &pattern).await
    }

    pub async fn purge_expired(&self) -> CacheResult<u64> {
        self.store.purge_expired(&self.name).await
    }

    pub async fn list_push(&self, key: &str, value: impl Into<Value>) -> CacheResult<usize> {
        self.store.list_push(&self.name, key, vec![value.into()]).await
    }

    pub async fn list_push_many(&self, key: &str, values: Vec<Value>) -> CacheResult<usize> {
        self.store.list_push(&self.name, key, values).await
    }

    /// Push, then (re)set the list's expiry when `ttl` is given
    pub async fn list_set(&self, key: &str, value: impl Into<Value>, ttl: Option<Duration>) -> CacheResult<usize> {
        let len = self.list_push(key, value).await?;
        if let Some(ttl) = ttl {
            self.store.expire(&self.name, key, ttl).await?;
        }
        Ok(len)
    }

    pub async fn list_get(&self, key: &str, start: i64, end: i64) -> CacheResult<Vec<Value>> {
        self.store.list_range(&self.name, key, start, end).await
    }

    pub async fn list_all(&self, key: &str) -> CacheResult<Vec<Value>> {
        self.list_get(key, 0, -1).await
    }

    /// Exact-member scan over the whole list
    pub async fn list_has(&self, key: &str, value: &Value) -> CacheResult<bool> {
        if is_empty_value(value) {
            return Err(CacheError::invalid("list_has: value must not be empty"));
        }
        Ok(self.list_all(key).await?.iter().any(|member| member == value))
    }

    /// Replace the list with `members`, or delete it when there are none.
    ///
    /// Pushes first and then trims to the pushed tail; a failed trim leaves the
    /// pushed members in place.
    pub async fn list_clear(&self, key: &str, members: Option<Vec<Value>>) -> CacheResult<()> {
        require_key("list_clear", key)?;

        let members = match members {
            Some(members) if !members.is_empty() => members,
            _ => {
                self.store.del(&self.name, key).await?;
                return Ok(());
            }
        };

        let n = members.len() as i64;
        let len = self.store.list_push(&self.name, key, members).await? as i64;
        self.store.list_trim(&self.name, key, len - n, len - 1).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::driver::MemoryDriver;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn adapter() -> CacheAdapter {
        init_tracing();
        let adapter = CacheAdapter::document(
            "test",
            None,
            CacheConfig::default(),
            Arc::new(MemoryDriver::new()),
            &LocalHub::new(),
        );
        adapter.open().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn add_never_overwrites() {
        let cache = adapter().await;
        assert!(cache.add("k", 1, None).await.unwrap());
        assert!(!cache.add("k", 2, None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn set_overwrites() {
        let cache = adapter().await;
        cache.set("k", "a", None).await.unwrap();
        cache.set("k", "b", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("b")));
    }

    #[tokio::test]
    async fn concurrent_add_has_one_winner() {
        let cache = Arc::new(adapter().await);
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.add("lock", i, None).await })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn has_and_del_lifecycle() {
        let cache = adapter().await;
        cache.set("k", json!({"a": 1}), None).await.unwrap();
        assert!(cache.has("k").await.unwrap());
        assert!(cache.del("k").await.unwrap());
        assert!(!cache.has("k").await.unwrap());
        assert!(!cache.del("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_keys_are_rejected() {
        let cache = adapter().await;
        assert!(matches!(cache.del("").await, Err(CacheError::InvalidArgument(_))));
        assert!(matches!(cache.clear(Some("")).await, Err(CacheError::InvalidArgument(_))));
        assert!(matches!(
            cache.list_clear("", Some(vec![json!(1)])).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let cache = adapter().await;
        cache.set("short", 1, Some(Duration::from_millis(20))).await.unwrap();
        cache.set("long", 2, None).await.unwrap();
        assert!(cache.has("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.has("long").await.unwrap());
    }

    #[tokio::test]
    async fn counters_increment_and_decrement() {
        let cache = adapter().await;
        assert_eq!(cache.add_int("n", 5).await.unwrap(), 5);
        assert_eq!(cache.add_int("n", -3).await.unwrap(), 2);
        assert_eq!(cache.add_int("fresh", -1).await.unwrap(), -1);

        assert_eq!(cache.add_float("f", 0.5).await.unwrap(), 0.5);
        assert_eq!(cache.add_float("f", -0.25).await.unwrap(), 0.25);
    }

    #[tokio::test]
    async fn add_str_concatenates() {
        let cache = adapter().await;
        assert_eq!(cache.add_str("s", "foo").await.unwrap(), 3);
        assert_eq!(cache.add_str("s", "bar").await.unwrap(), 6);
        assert_eq!(cache.get("s").await.unwrap(), Some(json!("foobar")));
        assert_eq!(cache.getrange("s", 0, 2).await.unwrap(), "foo");
        assert_eq!(cache.getrange("s", 3, -1).await.unwrap(), "bar");
        assert_eq!(cache.setrange("s", 3, "BAZ").await.unwrap(), 6);
        assert_eq!(cache.get("s").await.unwrap(), Some(json!("fooBAZ")));
    }

    #[tokio::test]
    async fn setrange_past_the_size_cap_is_rejected() {
        let cache = adapter().await;
        let err = cache.setrange("s", range::MAX_STRING_LEN, "x").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
        assert!(matches!(
            cache.setrange("s", usize::MAX, "x").await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert_eq!(cache.get("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn counters_survive_whole_float_increments() {
        let cache = adapter().await;
        assert_eq!(cache.add_float("n", 2.0).await.unwrap(), 2.0);
        assert_eq!(cache.add_int("n", 1).await.unwrap(), 3);

        cache.set("f", 1.5, None).await.unwrap();
        assert!(cache.add_int("f", 1).await.is_err());
        assert_eq!(cache.get("f").await.unwrap(), Some(json!(1.5)));
    }

    #[tokio::test]
    async fn clear_one_key_or_the_table() {
        let cache = adapter().await;
        for key in ["a", "b", "c"] {
            cache.set(key, key, None).await.unwrap();
        }
        assert_eq!(cache.clear(Some("a")).await.unwrap(), 1);
        assert_eq!(cache.clear(Some("a")).await.unwrap(), 0);
        assert_eq!(cache.clear(None).await.unwrap(), 2);
        assert!(cache.keys(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn key_patterns() {
        let cache = adapter().await;
        for key in ["abc", "abcd", "xabc", "xabcx", "zzz"] {
            cache.set(key, 1, None).await.unwrap();
        }

        assert_eq!(cache.keys(Some("*abc*")).await.unwrap(), vec!["abc", "abcd", "xabc", "xabcx"]);
        assert_eq!(cache.keys(Some("abc*")).await.unwrap(), vec!["abc", "abcd"]);
        assert_eq!(cache.keys(Some("*abc")).await.unwrap(), vec!["abc", "xabc"]);
        assert_eq!(cache.keys(Some("abc")).await.unwrap(), vec!["abc"]);
        assert_eq!(cache.keys(None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn list_push_keeps_order() {
        let cache = adapter().await;
        assert_eq!(cache.list_push("l", "x").await.unwrap(), 1);
        assert_eq!(cache.list_push("l", "y").await.unwrap(), 2);
        assert_eq!(cache.list_push_many("l", vec![json!("z"), json!(1)]).await.unwrap(), 4);
        assert_eq!(cache.list_all("l").await.unwrap(), vec![json!("x"), json!("y"), json!("z"), json!(1)]);
        assert_eq!(cache.list_get("l", 1, 2).await.unwrap(), vec![json!("y"), json!("z")]);
        assert_eq!(cache.sort("l").await.unwrap(), vec![json!(1), json!("x"), json!("y"), json!("z")]);
    }

    #[tokio::test]
    async fn list_clear_replaces_everything() {
        let cache = adapter().await;
        cache
            .list_push_many("l", vec![json!("x"), json!("y"), json!("z")])
            .await
            .unwrap();

        cache.list_clear("l", Some(vec![json!("a"), json!("b")])).await.unwrap();
        assert_eq!(cache.list_all("l").await.unwrap(), vec![json!("a"), json!("b")]);

        cache.list_clear("l", None).await.unwrap();
        assert!(!cache.has("l").await.unwrap());
    }

    #[tokio::test]
    async fn list_has_is_exact() {
        let cache = adapter().await;
        cache.list_push_many("l", vec![json!("apple"), json!(3)]).await.unwrap();

        assert!(cache.list_has("l", &json!("apple")).await.unwrap());
        assert!(!cache.list_has("l", &json!("app")).await.unwrap());
        assert!(cache.list_has("l", &json!(3)).await.unwrap());
        assert!(!cache.list_has("l", &json!("3")).await.unwrap());
        assert!(matches!(cache.list_has("l", &json!("")).await, Err(CacheError::InvalidArgument(_))));
        assert!(matches!(cache.list_has("l", &Value::Null).await, Err(CacheError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn list_set_applies_ttl() {
        let cache = adapter().await;
        assert_eq!(cache.list_set("l", 1, Some(Duration::from_millis(20))).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.list_all("l").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tables_do_not_share_keys() {
        let cache = adapter().await;
        cache.table("a").set("k", 1, None).await.unwrap();
        cache.table("b").set("k", 2, None).await.unwrap();
        assert_eq!(cache.table("a").get("k").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.default_table().name(), "cache");
    }

    #[tokio::test]
    async fn channels_route_through_the_adapter() {
        let hub = LocalHub::new();
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let a = CacheAdapter::document("a", None, CacheConfig::default(), driver.clone(), &hub);
        let b = CacheAdapter::document("b", None, CacheConfig::default(), driver, &hub);

        let hits = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let h = hits.clone();
        a.subscribe_with("events", move |_message: String| {
            let h = h.clone();
            let done_tx = done_tx.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                done_tx.send(())?;
                anyhow::Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(b.publish("events", "ping").await.unwrap(), 1);
        tokio::time::timeout(Duration::from_secs(1), done_rx.recv())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        a.close().await.unwrap();
        assert_eq!(b.publish("events", "ping").await.unwrap(), 0);
    }

    #[test]
    fn load_config_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("cache.toml")).unwrap();
        writeln!(file, "[cache]\nhost = \"db.internal\"\nport = 27018").unwrap();

        let adapter = CacheAdapter::document(
            "cfg",
            Some(dir.path().to_path_buf()),
            CacheConfig::default(),
            Arc::new(MemoryDriver::new()),
            &LocalHub::new(),
        );
        let config = adapter.load_config("cache.toml").unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 27018);
        assert_eq!(config.database, "mm");
    }
}
