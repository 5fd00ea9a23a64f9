use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use tracing::debug;
use url::Url;

use super::{
    Client, Database, Document, Driver, DriverError, DriverResult, Filter, FindOptions, ID_FIELD,
    Update, UpdateOutcome,
};
use crate::core::range;

type Collection = BTreeMap<String, Document>;

/// In-process document store.
///
/// Behaves like a single database server: every client connected through the
/// same driver (or a clone of it) sees the same databases. Updates to one
/// document are atomic.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<Server>,
}

#[derive(Default)]
struct Server {
    databases: DashMap<String, Arc<MemoryDatabase>>,
    credentials: Option<(String, String)>,
    offline: AtomicBool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require these credentials on connect
    pub fn with_credentials(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Server {
                credentials: Some((user.into(), password.into())),
                ..Default::default()
            }),
        }
    }

    /// Simulate an outage: connects fail while offline
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_credentials(&self, url: &Url) -> DriverResult<()> {
        let Some((user, password)) = &self.inner.credentials else {
            return Ok(());
        };

        // Compare in encoded form, the way the URL carries them
        let mut expected = Url::parse("memory://localhost/")
            .map_err(|e| DriverError::InvalidUrl(e.to_string()))?;
        expected
            .set_username(user)
            .and_then(|_| expected.set_password(Some(password.as_str())))
            .map_err(|_| DriverError::InvalidUrl("cannot carry credentials".into()))?;

        if url.username() == expected.username() && url.password() == expected.password() {
            Ok(())
        } else {
            Err(DriverError::Auth(format!("rejected user '{}'", url.username())))
        }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, url: &str, _options: &Map<String, Value>) -> DriverResult<Box<dyn Client>> {
        let parsed = Url::parse(url).map_err(|e| DriverError::InvalidUrl(format!("{url}: {e}")))?;
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(DriverError::Unreachable(format!(
                "{}:{}",
                parsed.host_str().unwrap_or_default(),
                parsed.port().unwrap_or_default()
            )));
        }
        self.check_credentials(&parsed)?;

        debug!("Memory driver accepted connection to {}", parsed.host_str().unwrap_or_default());
        Ok(Box::new(MemoryClient {
            server: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryClient {
    server: Arc<Server>,
    closed: AtomicBool,
}

#[async_trait]
impl Client for MemoryClient {
    fn database(&self, name: &str) -> Arc<dyn Database> {
        let db: Arc<MemoryDatabase> = self
            .server
            .databases
            .entry(name.to_string())
            .or_default()
            .clone();
        db
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    collections: RwLock<HashMap<String, Collection>>,
}

fn id_of(doc: &mut Document) -> String {
    match doc.get(ID_FIELD) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
    }
}

/// `n` as an integer when it has no fractional part and fits an `i64`
fn integral(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64).then_some(n as i64)
}

fn increment_int(current: Option<&Value>, by: i64) -> DriverResult<Value> {
    let current = match current {
        None | Some(Value::Null) => 0,
        Some(value) => value.as_i64().ok_or_else(|| {
            DriverError::Operation(format!("cannot increment non-integer value {value}"))
        })?,
    };
    current
        .checked_add(by)
        .map(Value::from)
        .ok_or_else(|| DriverError::Operation("increment would overflow".into()))
}

fn increment(current: Option<&Value>, by: &Value) -> DriverResult<Value> {
    let current = current.cloned().unwrap_or(Value::from(0));
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        return a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| DriverError::Operation("increment would overflow".into()));
    }
    match (current.as_f64(), by.as_f64()) {
        (Some(a), Some(b)) => match integral(a + b) {
            Some(n) => Ok(Value::from(n)),
            None => Number::from_f64(a + b)
                .map(Value::Number)
                .ok_or_else(|| DriverError::Operation("increment produced a non-finite number".into())),
        },
        _ => Err(DriverError::Operation(format!(
            "cannot increment non-numeric value {current}"
        ))),
    }
}

fn apply(doc: &Document, updates: &[Update]) -> DriverResult<Document> {
    let mut next = doc.clone();
    for update in updates {
        match update {
            Update::Set(field, value) => {
                next.insert(field.clone(), value.clone());
            }
            Update::Unset(field) => {
                next.remove(field);
            }
            Update::Inc(field, by) => {
                let value = increment(next.get(field), by)?;
                next.insert(field.clone(), value);
            }
            Update::IncInt(field, by) => {
                let value = increment_int(next.get(field), *by)?;
                next.insert(field.clone(), value);
            }
            Update::Append(field, tail) => {
                let mut s = match next.get(field) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(other) => {
                        return Err(DriverError::Operation(format!(
                            "cannot append to non-string value {other}"
                        )));
                    }
                };
                s.push_str(tail);
                next.insert(field.clone(), Value::String(s));
            }
            Update::Push(field, items) => match next.get_mut(field) {
                Some(Value::Array(list)) => list.extend(items.iter().cloned()),
                None => {
                    next.insert(field.clone(), Value::Array(items.clone()));
                }
                Some(other) => {
                    return Err(DriverError::Operation(format!(
                        "cannot push to non-array value {other}"
                    )));
                }
            },
            Update::Slice(field, start, end) => match next.get_mut(field) {
                Some(Value::Array(list)) => {
                    *list = match range::resolve(list.len(), *start, *end) {
                        Some(window) => list[window].to_vec(),
                        None => Vec::new(),
                    };
                }
                None => {}
                Some(other) => {
                    return Err(DriverError::Operation(format!(
                        "cannot slice non-array value {other}"
                    )));
                }
            },
        }
    }
    Ok(next)
}

fn seed(filter: &Filter) -> Document {
    let mut doc = Document::new();
    for (field, value) in filter.equalities() {
        doc.insert(field.to_string(), value.clone());
    }
    doc
}

impl MemoryDatabase {
    /// Insert an upserted document built from the filter, returning its post-image
    fn upsert(collection: &mut Collection, filter: &Filter, updates: &[Update]) -> DriverResult<Document> {
        let mut doc = apply(&seed(filter), updates)?;
        let id = id_of(&mut doc);
        if collection.contains_key(&id) {
            return Err(DriverError::DuplicateKey(id));
        }
        collection.insert(id, doc.clone());
        Ok(doc)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_collection(&self, name: &str) -> DriverResult<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(DriverError::AlreadyExists(name.to_string()));
        }
        collections.insert(name.to_string(), Collection::new());
        Ok(())
    }

    async fn list_collections(&self) -> DriverResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> DriverResult<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        let id = id_of(&mut doc);
        if coll.contains_key(&id) {
            return Err(DriverError::DuplicateKey(id));
        }
        coll.insert(id, doc);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> DriverResult<u64> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        // All or nothing: validate ids before writing
        let mut staged = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = id_of(&mut doc);
            if coll.contains_key(&id) || staged.iter().any(|(existing, _)| existing == &id) {
                return Err(DriverError::DuplicateKey(id));
            }
            staged.push((id, doc));
        }

        let count = staged.len() as u64;
        coll.extend(staged);
        Ok(count)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> DriverResult<u64> {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = coll.len();
        coll.retain(|_, doc| !filter.matches(doc));
        Ok((before - coll.len()) as u64)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        upsert: bool,
    ) -> DriverResult<UpdateOutcome> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        // Stage every post-image first so a failing update leaves nothing half-applied
        let mut staged = Vec::new();
        for (id, doc) in coll.iter().filter(|(_, doc)| filter.matches(doc)) {
            let next = apply(doc, updates)?;
            let changed = &next != doc;
            staged.push((id.clone(), next, changed));
        }

        if staged.is_empty() {
            if upsert {
                Self::upsert(coll, filter, updates)?;
                return Ok(UpdateOutcome {
                    upserted: true,
                    ..Default::default()
                });
            }
            return Ok(UpdateOutcome::default());
        }

        let mut outcome = UpdateOutcome::default();
        for (id, next, changed) in staged {
            outcome.matched += 1;
            if changed {
                outcome.modified += 1;
            }
            coll.insert(id, next);
        }
        Ok(outcome)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        upsert: bool,
    ) -> DriverResult<Option<Document>> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        if let Some(doc) = coll.values_mut().find(|doc| filter.matches(doc)) {
            *doc = apply(doc, updates)?;
            return Ok(Some(doc.clone()));
        }

        if upsert {
            return Self::upsert(coll, filter, updates).map(Some);
        }
        Ok(None)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> DriverResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let matching = coll
            .values()
            .filter(|doc| filter.matches(doc))
            .skip(options.skip as usize);

        Ok(match options.limit {
            Some(limit) => matching.take(limit as usize).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }
}
