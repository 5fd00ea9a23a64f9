//! Document-store driver abstraction.
//!
//! The cache layer only talks to a document database through these traits,
//! so any driver (a network client, the in-process [`MemoryDriver`]) can sit
//! underneath a [`Connection`].

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod connection;
pub mod memory;

pub use connection::{Connection, Page, TableRef};
pub use memory::MemoryDriver;

/// A stored document
pub type Document = Map<String, Value>;

/// Primary key field of every document
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("collection already exists: {0}")]
    AlreadyExists(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("client closed")]
    Closed,
}

pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Queries
// ============================================================================

/// Document selector
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every document
    All,
    /// Field equals value
    Eq(String, Value),
    /// String field matches the expression
    Regex(String, Regex),
    /// Numeric field is less than or equal to the bound
    Lte(String, f64),
    /// Numeric field is strictly greater than the bound
    Gt(String, f64),
    /// Field presence
    Exists(String, bool),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn id(key: impl Into<String>) -> Self {
        Filter::Eq(ID_FIELD.to_string(), Value::String(key.into()))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut list) => {
                list.push(other);
                Filter::And(list)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::Regex(field, re) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| re.is_match(s)),
            Filter::Lte(field, bound) => doc
                .get(field)
                .and_then(Value::as_f64)
                .is_some_and(|n| n <= *bound),
            Filter::Gt(field, bound) => doc
                .get(field)
                .and_then(Value::as_f64)
                .is_some_and(|n| n > *bound),
            Filter::Exists(field, present) => doc.contains_key(field) == *present,
            Filter::And(list) => list.iter().all(|f| f.matches(doc)),
            Filter::Or(list) => list.iter().any(|f| f.matches(doc)),
        }
    }

    /// Field values pinned by equality, used to seed upserted documents
    pub fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Filter::Eq(field, value) => vec![(field.as_str(), value)],
            Filter::And(list) => list.iter().flat_map(Filter::equalities).collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Updates
// ============================================================================

/// Field-level update operator, applied atomically per document
#[derive(Debug, Clone)]
pub enum Update {
    Set(String, Value),
    Unset(String),
    /// Numeric add; integral results are stored as integers
    Inc(String, Value),
    /// Integer add; fails without writing unless the field is missing or an integer
    IncInt(String, i64),
    /// String concatenation, missing field starts empty
    Append(String, String),
    /// Array append, missing field starts empty
    Push(String, Vec<Value>),
    /// Keep the inclusive `[start, end]` window of an array (negatives count from the end)
    Slice(String, i64, i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

/// Pagination window for `find`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: u64,
    pub limit: Option<u64>,
}

// ============================================================================
// Driver traits
// ============================================================================

/// Entry point of a document driver
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Driver name for logging (e.g., "memory", "mongodb")
    fn name(&self) -> &'static str;

    async fn connect(&self, url: &str, options: &Map<String, Value>) -> DriverResult<Box<dyn Client>>;
}

/// An established connection
#[async_trait]
pub trait Client: Send + Sync {
    fn database(&self, name: &str) -> Arc<dyn Database>;

    async fn close(&self) -> DriverResult<()>;
}

/// A logical database holding collections
#[async_trait]
pub trait Database: Send + Sync {
    async fn create_collection(&self, name: &str) -> DriverResult<()>;

    async fn list_collections(&self) -> DriverResult<Vec<String>>;

    async fn insert_one(&self, collection: &str, doc: Document) -> DriverResult<()>;

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> DriverResult<u64>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> DriverResult<u64>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        upsert: bool,
    ) -> DriverResult<UpdateOutcome>;

    /// Update the first match and return its post-image
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        upsert: bool,
    ) -> DriverResult<Option<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> DriverResult<Vec<Document>>;
}
