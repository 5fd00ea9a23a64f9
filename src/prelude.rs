// Convenience re-exports: use mm_cache::prelude::*;
pub use crate::core::{
    Backend, CacheAdapter, CacheConfig, CacheError, CacheResult, CacheStore, ConfigOverrides,
    KeyPattern, ScopeRegistry, TableCache,
};

pub use crate::driver::{Driver, MemoryDriver};
