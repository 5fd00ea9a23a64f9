pub mod adapter;
pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod pattern;
pub mod range;
pub mod registry;
pub mod store;

pub use adapter::{CacheAdapter, TableCache};
pub use channel::{ChannelDispatcher, ChannelTransport, InboundMessage};
pub use config::{Backend, CacheConfig, ConfigOverrides, ConfigStore, Configurable};
pub use error::{CacheError, CacheResult};
pub use handler::{ChannelHandler, DefaultHandler};
pub use pattern::KeyPattern;
pub use registry::{DEFAULT_SCOPE, ScopeRegistry};
pub use store::CacheStore;
