use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    Client, Database, Document, Driver, DriverError, Filter, FindOptions, Update, UpdateOutcome,
};
use crate::core::config::CacheConfig;
use crate::core::error::{CacheError, CacheResult};

/// 1-indexed result window; `0` in either field means "everything"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub size: u64,
}

impl Page {
    pub const ALL: Page = Page { page: 0, size: 0 };

    pub fn new(page: u64, size: u64) -> Self {
        Self { page, size }
    }

    fn options(self) -> FindOptions {
        if self.page != 0 && self.size != 0 {
            FindOptions {
                skip: (self.page - 1).saturating_mul(self.size),
                limit: Some(self.size),
            }
        } else {
            FindOptions::default()
        }
    }
}

struct Session {
    client: Box<dyn Client>,
    db: Arc<dyn Database>,
}

/// One lazily opened connection to a document store plus its selected database
pub struct Connection {
    config: CacheConfig,
    driver: Arc<dyn Driver>,
    session: RwLock<Option<Session>>,
}

impl Connection {
    pub fn new(config: CacheConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            config,
            driver,
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Connect and select the configured database; a no-op when already open
    pub async fn open(&self) -> CacheResult<()> {
        let mut session = self.session.write().await;
        if session.is_some() {
            return Ok(());
        }

        let url = self.config.url()?;
        let client = self
            .driver
            .connect(url.as_str(), &self.config.options)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let db = client.database(&self.config.database);

        info!(
            "Connected to {}:{} via {} driver, database '{}'",
            self.config.host,
            self.config.port,
            self.driver.name(),
            self.config.database
        );
        *session = Some(Session { client, db });
        Ok(())
    }

    /// Release the connection if one is held
    pub async fn close(&self) -> CacheResult<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        info!("Closing connection to {}:{}", self.config.host, self.config.port);
        session.client.close().await.map_err(CacheError::from)
    }

    pub async fn is_open(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn database(&self) -> CacheResult<Arc<dyn Database>> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.db.clone())
            .ok_or(CacheError::NotConnected)
    }

    /// Bind subsequent raw operations to `name`; existence is not checked
    pub fn select_table(&self, name: impl Into<String>) -> TableRef<'_> {
        TableRef {
            conn: self,
            name: name.into(),
        }
    }

    /// Create a collection explicitly (the configured default when `name` is `None`)
    pub async fn create_table(&self, name: Option<&str>) -> CacheResult<()> {
        let name = name.unwrap_or(&self.config.table);
        self.database().await?.create_collection(name).await?;
        debug!("Created table '{}'", name);
        Ok(())
    }

    /// Like [`create_table`](Self::create_table), but an existing table is fine
    pub async fn ensure_table(&self, name: Option<&str>) -> CacheResult<()> {
        match self.create_table(name).await {
            Err(err) if err.is_already_exists() => {
                warn!("{}", err);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn list_tables(&self) -> CacheResult<Vec<String>> {
        Ok(self.database().await?.list_collections().await?)
    }

    pub async fn insert_one(&self, table: &str, doc: Document) -> CacheResult<()> {
        Ok(self.database().await?.insert_one(table, doc).await?)
    }

    /// Insert unless a document with the same `_id` exists; `false` on collision
    pub async fn insert_if_absent(&self, table: &str, doc: Document) -> CacheResult<bool> {
        match self.database().await?.insert_one(table, doc).await {
            Ok(()) => Ok(true),
            Err(DriverError::DuplicateKey(id)) => {
                debug!("Key '{}' already present in '{}'", id, table);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn insert_many(&self, table: &str, docs: Vec<Document>) -> CacheResult<u64> {
        Ok(self.database().await?.insert_many(table, docs).await?)
    }

    pub async fn remove(&self, table: &str, filter: &Filter) -> CacheResult<u64> {
        Ok(self.database().await?.delete_many(table, filter).await?)
    }

    pub async fn update(
        &self,
        table: &str,
        filter: &Filter,
        updates: &[Update],
        upsert: bool,
    ) -> CacheResult<UpdateOutcome> {
        Ok(self
            .database()
            .await?
            .update_many(table, filter, updates, upsert)
            .await?)
    }

    pub async fn find_one_and_update(
        &self,
        table: &str,
        filter: &Filter,
        updates: &[Update],
        upsert: bool,
    ) -> CacheResult<Option<Document>> {
        Ok(self
            .database()
            .await?
            .find_one_and_update(table, filter, updates, upsert)
            .await?)
    }

    pub async fn find(&self, table: &str, filter: &Filter, page: Page) -> CacheResult<Vec<Document>> {
        Ok(self
            .database()
            .await?
            .find(table, filter, page.options())
            .await?)
    }
}

/// Raw operations bound to one table
pub struct TableRef<'a> {
    conn: &'a Connection,
    name: String,
}

impl TableRef<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn create(&self) -> CacheResult<()> {
        self.conn.create_table(Some(&self.name)).await
    }

    pub async fn insert_one(&self, doc: Document) -> CacheResult<()> {
        self.conn.insert_one(&self.name, doc).await
    }

    pub async fn insert_many(&self, docs: Vec<Document>) -> CacheResult<u64> {
        self.conn.insert_many(&self.name, docs).await
    }

    pub async fn remove(&self, filter: &Filter) -> CacheResult<u64> {
        self.conn.remove(&self.name, filter).await
    }

    pub async fn update(&self, filter: &Filter, updates: &[Update]) -> CacheResult<UpdateOutcome> {
        self.conn.update(&self.name, filter, updates, false).await
    }

    pub async fn find(&self, filter: &Filter, page: Page) -> CacheResult<Vec<Document>> {
        self.conn.find(&self.name, filter, page).await
    }
}
