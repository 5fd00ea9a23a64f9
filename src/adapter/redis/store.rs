use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use redis::ErrorKind;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{decode, encode, namespaced};
use crate::core::config::{Backend, CacheConfig};
use crate::core::error::{CacheError, CacheResult};
use crate::core::pattern::KeyPattern;
use crate::core::store::CacheStore;

/// Option key selecting the connection pool size
const POOL_SIZE: &str = "poolSize";

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

pub struct RedisStore {
    config: CacheConfig,
    pool: RwLock<Option<Pool>>,
}

impl RedisStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Connection URL; a numeric `database` selects the redis db index
    pub fn url(&self) -> CacheResult<String> {
        let mut url = self.config.url()?;
        if self.config.database.parse::<u8>().is_ok() {
            url.set_path(&format!("/{}", self.config.database));
        }
        Ok(url.into())
    }

    pub(crate) async fn connection(&self) -> CacheResult<deadpool_redis::Connection> {
        let pool = self.pool.read().await.clone().ok_or(CacheError::NotConnected)?;
        Ok(pool.get().await?)
    }

    pub(crate) async fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        let mut conn = self.connection().await?;
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> Backend {
        Backend::Redis
    }

    async fn open(&self) -> CacheResult<()> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let mut cfg = deadpool_redis::Config::from_url(self.url()?);
        if let Some(size) = self.config.options.get(POOL_SIZE).and_then(Value::as_u64) {
            cfg.pool = Some(PoolConfig::new(size as usize));
        }
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        // Fail fast on unreachable servers and bad credentials
        let mut conn = pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        info!("Connected to redis at {}:{}", self.config.host, self.config.port);
        *slot = Some(pool);
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close();
            info!("Closed redis pool for {}:{}", self.config.host, self.config.port);
        }
        Ok(())
    }

    async fn set(&self, table: &str, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(namespaced(table, key)).arg(encode(&value));
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(true)
    }

    async fn add(&self, table: &str, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(namespaced(table, key)).arg(encode(&value)).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, table: &str, key: &str) -> CacheResult<Option<Value>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(namespaced(table, key))
            .query_async(&mut conn)
            .await?;
        Ok(raw.map(decode))
    }

    async fn has(&self, table: &str, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let n: i64 = redis::cmd("EXISTS")
            .arg(namespaced(table, key))
            .query_async(&mut conn)
            .await?;
        Ok(n > 0)
    }

    async fn del(&self, table: &str, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let n: i64 = redis::cmd("DEL")
            .arg(namespaced(table, key))
            .query_async(&mut conn)
            .await?;
        Ok(n > 0)
    }

    async fn expire(&self, table: &str, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let n: i64 = redis::cmd("PEXPIRE")
            .arg(namespaced(table, key))
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(n > 0)
    }

    async fn incr(&self, table: &str, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.connection().await?;
        let (command, amount) = match delta.checked_neg() {
            Some(magnitude) if delta < 0 => ("DECRBY", magnitude),
            _ => ("INCRBY", delta),
        };
        let value: i64 = redis::cmd(command)
            .arg(namespaced(table, key))
            .arg(amount)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn incr_float(&self, table: &str, key: &str, delta: f64) -> CacheResult<f64> {
        let mut conn = self.connection().await?;
        let value: f64 = redis::cmd("INCRBYFLOAT")
            .arg(namespaced(table, key))
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn append(&self, table: &str, key: &str, suffix: &str) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        let len: usize = redis::cmd("APPEND")
            .arg(namespaced(table, key))
            .arg(suffix)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn get_range(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<String> {
        let mut conn = self.connection().await?;
        let s: String = redis::cmd("GETRANGE")
            .arg(namespaced(table, key))
            .arg(start)
            .arg(end)
            .query_async(&mut conn)
            .await?;
        Ok(s)
    }

    async fn set_range(&self, table: &str, key: &str, index: usize, value: &str) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        let len: usize = redis::cmd("SETRANGE")
            .arg(namespaced(table, key))
            .arg(index)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn clear(&self, table: &str) -> CacheResult<u64> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(KeyPattern::All.to_glob(&namespaced(table, "")))
            .query_async(&mut conn)
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let removed: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
        debug!("Cleared {} keys from '{}'", removed, table);
        Ok(removed)
    }

    async fn sort(&self, table: &str, key: &str) -> CacheResult<Vec<Value>> {
        let mut conn = self.connection().await?;
        let key = namespaced(table, key);

        let numeric: redis::RedisResult<Vec<String>> =
            redis::cmd("SORT").arg(&key).query_async(&mut conn).await;
        let members = match numeric {
            Ok(members) => members,
            // Non-numeric members: fall back to lexicographic order
            Err(e) if e.kind() == ErrorKind::ResponseError => {
                redis::cmd("SORT")
                    .arg(&key)
                    .arg("ALPHA")
                    .query_async(&mut conn)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };
        Ok(members.into_iter().map(decode).collect())
    }

    async fn keys(&self, table: &str, pattern: &KeyPattern) -> CacheResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let prefix = namespaced(table, "");
        let found: Vec<String> = redis::cmd("KEYS")
            .arg(pattern.to_glob(&prefix))
            .query_async(&mut conn)
            .await?;

        let mut keys: Vec<String> = found
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn list_push(&self, table: &str, key: &str, values: Vec<Value>) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        let key = namespaced(table, key);
        if values.is_empty() {
            let len: usize = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await?;
            return Ok(len);
        }

        let members: Vec<String> = values.iter().map(encode).collect();
        let len: usize = redis::cmd("RPUSH")
            .arg(&key)
            .arg(members)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn list_range(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<Vec<Value>> {
        let mut conn = self.connection().await?;
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(namespaced(table, key))
            .arg(start)
            .arg(end)
            .query_async(&mut conn)
            .await?;
        Ok(members.into_iter().map(decode).collect())
    }

    async fn list_trim(&self, table: &str, key: &str, start: i64, end: i64) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("LTRIM")
            .arg(namespaced(table, key))
            .arg(start)
            .arg(end)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigOverrides;

    fn config(overrides: ConfigOverrides) -> CacheConfig {
        CacheConfig::default()
            .merged(ConfigOverrides::default().backend(Backend::Redis).port(6379))
            .merged(overrides)
    }

    #[test]
    fn url_selects_numeric_database() {
        let store = RedisStore::new(config(ConfigOverrides::default().database("3")));
        assert_eq!(store.url().unwrap(), "redis://localhost:6379/3");

        let store = RedisStore::new(config(ConfigOverrides::default()));
        assert_eq!(store.url().unwrap(), "redis://localhost:6379/");
    }

    #[test]
    fn ttl_rounds_up_to_a_millisecond() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    async fn commands_before_open_fail() {
        let store = RedisStore::new(config(ConfigOverrides::default()));
        assert!(matches!(store.get("cache", "k").await, Err(CacheError::NotConnected)));
    }

    #[tokio::test]
    async fn unreachable_server_fails_open() {
        let store = RedisStore::new(config(ConfigOverrides::default().host("127.0.0.1").port(1)));
        assert!(matches!(store.open().await, Err(CacheError::Connection(_))));
        // close without a pool is fine
        store.close().await.unwrap();
    }
}
