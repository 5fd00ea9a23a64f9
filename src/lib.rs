//! Cache-style access over a document store, with named pub/sub channels.
//!
//! A [`ScopeRegistry`] hands out one [`CacheAdapter`] per scope. Each adapter
//! translates cache primitives (TTL'd get/set, counters, string ranges, lists,
//! key patterns) into calls on its backend, either a document database reached
//! through a [`driver::Driver`] or redis, and routes inbound channel messages
//! to per-channel handlers.
//!
//! ```no_run
//! use mm_cache::prelude::*;
//! use serde_json::json;
//!
//! # async fn demo() -> CacheResult<()> {
//! let registry = ScopeRegistry::default();
//! let cache = registry.open(Some("web"), None, None).await?;
//!
//! cache.set("greeting", "hello", None).await?;
//! cache.add_int("visits", 1).await?;
//! cache.list_clear("recent", Some(vec![json!("a"), json!("b")])).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod core;
pub mod driver;
pub mod prelude;

pub use crate::core::{CacheAdapter, CacheError, CacheResult, ScopeRegistry};
