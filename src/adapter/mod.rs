pub mod document;
pub mod local;
pub mod redis;

pub use document::DocumentStore;
pub use local::{LocalChannels, LocalHub};
pub use redis::{RedisChannels, RedisStore};
