use thiserror::Error;

use crate::driver::DriverError;

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the cache adapter and its backends
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend unreachable or credentials rejected
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation was issued before `open()`
    #[error("not connected: call open() first")]
    NotConnected,

    /// Any backend failure during a cache or list operation
    #[error("storage error: {0}")]
    Storage(String),

    /// Rejected before any backend call was made
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Table (collection) creation collided with an existing one
    #[error("table already exists: {0}")]
    AlreadyExists(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CacheError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Whether the caller may treat this error as "nothing to do"
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<DriverError> for CacheError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Unreachable(msg) | DriverError::Auth(msg) => Self::Connection(msg),
            DriverError::AlreadyExists(name) => Self::AlreadyExists(name),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_io_error() {
            Self::Connection(err.to_string())
        } else {
            Self::Storage(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}
