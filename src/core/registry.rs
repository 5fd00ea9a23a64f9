use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use super::adapter::CacheAdapter;
use super::config::{Backend, CacheConfig, ConfigOverrides};
use super::error::CacheResult;
use crate::adapter::local::LocalHub;
use crate::driver::{Driver, MemoryDriver};

/// Scope used when a lookup names none
pub const DEFAULT_SCOPE: &str = "sys";

/// Scope name → adapter, one adapter per scope for the registry's lifetime.
///
/// Owned by the application and shared by `Arc`; the first lookup of a scope
/// decides its directory and configuration.
pub struct ScopeRegistry {
    default_scope: String,
    defaults: CacheConfig,
    driver: Arc<dyn Driver>,
    hub: LocalHub,
    adapters: DashMap<String, Arc<CacheAdapter>>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new(Arc::new(MemoryDriver::new()))
    }
}

impl ScopeRegistry {
    /// Registry whose document-backed adapters connect through `driver`
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            default_scope: DEFAULT_SCOPE.to_string(),
            defaults: CacheConfig::default(),
            driver,
            hub: LocalHub::new(),
            adapters: DashMap::new(),
        }
    }

    pub fn with_default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scope = scope.into();
        self
    }

    /// Base configuration every new adapter's overrides are merged onto
    pub fn with_defaults(mut self, defaults: CacheConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn default_scope(&self) -> &str {
        &self.default_scope
    }

    /// Adapter for `scope`, built on first lookup.
    ///
    /// Later lookups return the same adapter and ignore `dir` and `overrides`.
    /// The adapter is not opened here.
    pub fn get_or_create(
        &self,
        scope: Option<&str>,
        dir: Option<&Path>,
        overrides: Option<ConfigOverrides>,
    ) -> Arc<CacheAdapter> {
        let scope = scope.unwrap_or(&self.default_scope);
        if let Some(existing) = self.adapters.get(scope) {
            if overrides.is_some() || dir.is_some() {
                warn!("Scope '{}' already exists, ignoring new settings", scope);
            }
            return existing.clone();
        }

        self.adapters
            .entry(scope.to_string())
            .or_insert_with(|| {
                let config = self.defaults.clone().merged(overrides.unwrap_or_default());
                let dir = dir.map(Path::to_path_buf);
                info!("Creating {:?} cache adapter for scope '{}'", config.backend, scope);
                let adapter = match config.backend {
                    Backend::Document => {
                        CacheAdapter::document(scope, dir, config, self.driver.clone(), &self.hub)
                    }
                    Backend::Redis => CacheAdapter::redis(scope, dir, config),
                };
                Arc::new(adapter)
            })
            .clone()
    }

    /// Like [`get_or_create`](Self::get_or_create), then open the adapter
    pub async fn open(
        &self,
        scope: Option<&str>,
        dir: Option<&Path>,
        overrides: Option<ConfigOverrides>,
    ) -> CacheResult<Arc<CacheAdapter>> {
        let adapter = self.get_or_create(scope, dir, overrides);
        adapter.open().await?;
        Ok(adapter)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.adapters.contains_key(scope)
    }

    /// Registered scope names in ascending order
    pub fn scopes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Close every adapter; entries stay registered and may be reopened
    pub async fn close_all(&self) -> CacheResult<()> {
        let adapters: Vec<Arc<CacheAdapter>> =
            self.adapters.iter().map(|e| e.value().clone()).collect();
        for adapter in adapters {
            adapter.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn same_scope_same_adapter() {
        let registry = ScopeRegistry::default();
        let a = registry.get_or_create(Some("web"), None, None);
        let b = registry.get_or_create(Some("web"), None, Some(ConfigOverrides::default().port(1)));
        assert!(Arc::ptr_eq(&a, &b));
        // first writer wins
        assert_eq!(b.config().port, 27017);

        let c = registry.get_or_create(Some("jobs"), None, None);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn omitted_scope_uses_default() {
        let registry = ScopeRegistry::default().with_default_scope("main");
        let a = registry.get_or_create(None, None, None);
        assert_eq!(a.scope(), "main");
        assert!(Arc::ptr_eq(&a, &registry.get_or_create(Some("main"), None, None)));
        assert!(registry.contains("main"));
        assert!(!registry.contains(DEFAULT_SCOPE));
    }

    #[tokio::test]
    async fn overrides_merge_onto_defaults() {
        let registry = ScopeRegistry::default().with_defaults(
            CacheConfig::default().merged(ConfigOverrides::default().host("db").option("poolSize", 4)),
        );
        let adapter = registry.get_or_create(
            Some("tenant"),
            Some(Path::new("/srv/tenant")),
            Some(ConfigOverrides::default().database("tenant").option("w", "majority")),
        );

        let config = adapter.config();
        assert_eq!(config.host, "db");
        assert_eq!(config.database, "tenant");
        assert_eq!(config.options.get("poolSize"), Some(&json!(4)));
        assert_eq!(config.options.get("w"), Some(&json!("majority")));
        assert_eq!(adapter.dir(), Some(Path::new("/srv/tenant")));
    }

    #[tokio::test]
    async fn scopes_share_the_driver_but_not_tables() {
        let registry = ScopeRegistry::default();
        let a = registry.open(Some("a"), None, None).await.unwrap();
        let b = registry
            .open(Some("b"), None, Some(ConfigOverrides::default().table("b_cache")))
            .await
            .unwrap();

        a.set("k", 1, None).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), None);
        assert_eq!(b.table("cache").get("k").await.unwrap(), Some(json!(1)));
        assert_eq!(registry.scopes(), vec!["a".to_string(), "b".to_string()]);

        registry.close_all().await.unwrap();
        assert!(a.get("k").await.is_err());
    }

    #[tokio::test]
    async fn concurrent_lookups_build_one_adapter() {
        let registry = Arc::new(ScopeRegistry::default());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(Some("shared"), None, None) })
            })
            .collect();

        let mut adapters = Vec::new();
        for task in tasks {
            adapters.push(task.await.unwrap());
        }
        assert!(adapters.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
