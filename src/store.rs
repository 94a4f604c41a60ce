//! In-memory document store.
//!
//! Databases hold named collections, collections hold JSON documents in
//! insertion order. The store is shared by `Arc` between tool providers, so all
//! access goes through an internal `RwLock`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// A stored document.
pub type Document = Map<String, JsonValue>;

type Collections = BTreeMap<String, Vec<Document>>;

/// Errors raised by the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Database does not exist.
    #[error("database '{0}' not found")]
    DatabaseNotFound(String),

    /// Collection does not exist.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// Collection already exists.
    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    /// Document or update is malformed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// An inserted `_id` is already taken.
    #[error("duplicate key: _id {0} already exists")]
    DuplicateKey(String),

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Summary line for `listDatabases`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    /// Database name
    pub name: String,
    /// Approximate serialized size of all documents
    pub size_on_disk: u64,
    /// Whether the database holds no documents
    pub empty: bool,
}

/// Statistics for `getDatabaseStats`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    /// Database name
    pub database: String,
    /// Number of collections
    pub collections: u64,
    /// Number of documents
    pub objects: u64,
    /// Serialized size of all documents
    pub data_size: u64,
    /// Average document size
    pub avg_obj_size: f64,
}

/// Statistics for a single collection.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    /// Collection name
    pub name: String,
    /// Number of documents
    pub count: u64,
    /// Serialized size of all documents
    pub size: u64,
    /// Average document size
    pub avg_obj_size: f64,
}

/// Outcome of an update.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    /// Documents matching the query
    pub matched_count: u64,
    /// Documents actually changed
    pub modified_count: u64,
}

/// One row of `group_by`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupRow {
    /// Group key; `null` for documents without the field
    #[serde(rename = "_id")]
    pub key: JsonValue,
    /// Documents in the group
    pub count: u64,
    /// Sum of the summed field, when one was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<JsonValue>,
}

/// The store.
#[derive(Debug, Default)]
pub struct DocStore {
    databases: RwLock<BTreeMap<String, Collections>>,
    next_id: AtomicU64,
}

impl DocStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Collections>>> {
        self.databases.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Collections>>> {
        self.databases.write().map_err(|_| StoreError::Poisoned)
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{:024x}", n)
    }

    // ========== DATABASES ==========

    /// List databases with their sizes.
    pub fn list_databases(&self) -> StoreResult<Vec<DatabaseSummary>> {
        let dbs = self.read()?;
        Ok(dbs
            .iter()
            .map(|(name, colls)| {
                let docs: Vec<&Document> = colls.values().flatten().collect();
                DatabaseSummary {
                    name: name.clone(),
                    size_on_disk: docs.iter().map(|d| doc_size(d)).sum(),
                    empty: docs.is_empty(),
                }
            })
            .collect())
    }

    /// Create a database with its first collection.
    pub fn create_database(&self, db: &str, initial_collection: &str) -> StoreResult<()> {
        self.create_collection(db, initial_collection)
    }

    /// Drop a database and everything in it.
    pub fn drop_database(&self, db: &str) -> StoreResult<()> {
        self.write()?
            .remove(db)
            .map(|_| ())
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))
    }

    /// Statistics for one database.
    pub fn database_stats(&self, db: &str) -> StoreResult<DatabaseStats> {
        let dbs = self.read()?;
        let colls = dbs
            .get(db)
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?;

        let objects: u64 = colls.values().map(|docs| docs.len() as u64).sum();
        let data_size: u64 = colls.values().flatten().map(doc_size).sum();
        Ok(DatabaseStats {
            database: db.to_string(),
            collections: colls.len() as u64,
            objects,
            data_size,
            avg_obj_size: average(data_size, objects),
        })
    }

    // ========== COLLECTIONS ==========

    /// Collections in a database with their stats.
    pub fn list_collections(&self, db: &str) -> StoreResult<Vec<CollectionStats>> {
        let dbs = self.read()?;
        let colls = dbs
            .get(db)
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?;
        Ok(colls
            .iter()
            .map(|(name, docs)| collection_stats(name, docs))
            .collect())
    }

    /// Create an empty collection, creating the database if needed.
    pub fn create_collection(&self, db: &str, collection: &str) -> StoreResult<()> {
        let mut dbs = self.write()?;
        let colls = dbs.entry(db.to_string()).or_default();
        if colls.contains_key(collection) {
            return Err(StoreError::CollectionExists(collection.to_string()));
        }
        colls.insert(collection.to_string(), Vec::new());
        Ok(())
    }

    /// Drop a collection.
    pub fn drop_collection(&self, db: &str, collection: &str) -> StoreResult<()> {
        let mut dbs = self.write()?;
        let colls = dbs
            .get_mut(db)
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?;
        colls
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }

    /// Rename a collection within a database.
    pub fn rename_collection(&self, db: &str, old_name: &str, new_name: &str) -> StoreResult<()> {
        let mut dbs = self.write()?;
        let colls = dbs
            .get_mut(db)
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?;
        if colls.contains_key(new_name) {
            return Err(StoreError::CollectionExists(new_name.to_string()));
        }
        let docs = colls
            .remove(old_name)
            .ok_or_else(|| StoreError::CollectionNotFound(old_name.to_string()))?;
        colls.insert(new_name.to_string(), docs);
        Ok(())
    }

    /// Statistics for one collection.
    pub fn collection_stats(&self, db: &str, collection: &str) -> StoreResult<CollectionStats> {
        let dbs = self.read()?;
        let docs = existing(&dbs, db, collection)?;
        Ok(collection_stats(collection, docs))
    }

    // ========== DOCUMENTS ==========

    /// Insert a document, assigning `_id` when absent. Returns the id.
    pub fn insert(&self, db: &str, collection: &str, doc: Document) -> StoreResult<String> {
        Ok(self
            .insert_many(db, collection, vec![doc])?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Insert several documents. Collections are created on first insert.
    ///
    /// All or nothing: an `_id` clashing with a stored document or with an
    /// earlier document of the batch rejects the whole batch.
    pub fn insert_many(
        &self,
        db: &str,
        collection: &str,
        docs: Vec<Document>,
    ) -> StoreResult<Vec<String>> {
        let mut prepared = Vec::with_capacity(docs.len());
        let mut ids = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = match doc.get("_id") {
                Some(JsonValue::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    let id = self.generate_id();
                    doc.insert("_id".to_string(), JsonValue::String(id.clone()));
                    id
                }
            };
            ids.push(id);
            prepared.push(doc);
        }

        let mut dbs = self.write()?;
        let docs = dbs
            .entry(db.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        let mut taken: Vec<&JsonValue> = docs.iter().filter_map(|d| d.get("_id")).collect();
        for doc in &prepared {
            if let Some(id) = doc.get("_id") {
                if taken.contains(&id) {
                    return Err(StoreError::DuplicateKey(id.to_string()));
                }
                taken.push(id);
            }
        }

        docs.extend(prepared);
        Ok(ids)
    }

    /// Documents matching `query`, at most `limit` of them.
    ///
    /// A missing collection reads as empty.
    pub fn find(
        &self,
        db: &str,
        collection: &str,
        query: &Document,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        let dbs = self.read()?;
        let Some(docs) = lookup(&dbs, db, collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|d| matches_query(d, query))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    /// Number of documents matching `query`.
    pub fn count(&self, db: &str, collection: &str, query: &Document) -> StoreResult<u64> {
        let dbs = self.read()?;
        Ok(lookup(&dbs, db, collection)
            .map(|docs| docs.iter().filter(|d| matches_query(d, query)).count() as u64)
            .unwrap_or(0))
    }

    /// Apply `update` to every document matching `query`.
    ///
    /// Supports `$set`, `$unset` and `$inc`; an update without operators
    /// merges its fields into each match.
    pub fn update(
        &self,
        db: &str,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome> {
        let ops = parse_update(update)?;
        let mut dbs = self.write()?;
        let docs = existing_mut(&mut dbs, db, collection)?;

        // Stage every change first so a failing operator leaves the collection untouched
        let mut staged = Vec::new();
        for (slot, doc) in docs.iter().enumerate() {
            if !matches_query(doc, query) {
                continue;
            }
            let mut next = doc.clone();
            for op in &ops {
                apply(&mut next, op)?;
            }
            staged.push((slot, next));
        }

        let mut outcome = UpdateOutcome {
            matched_count: staged.len() as u64,
            modified_count: 0,
        };
        for (slot, next) in staged {
            if docs[slot] != next {
                docs[slot] = next;
                outcome.modified_count += 1;
            }
        }
        Ok(outcome)
    }

    /// Delete every document matching `query`. Returns the number removed.
    pub fn delete(&self, db: &str, collection: &str, query: &Document) -> StoreResult<u64> {
        let mut dbs = self.write()?;
        let docs = existing_mut(&mut dbs, db, collection)?;
        let before = docs.len();
        docs.retain(|d| !matches_query(d, query));
        Ok((before - docs.len()) as u64)
    }

    // ========== ANALYTICS ==========

    /// Distinct values of a field among documents matching `filter`, in
    /// first-seen order.
    pub fn distinct(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        filter: &Document,
    ) -> StoreResult<Vec<JsonValue>> {
        let dbs = self.read()?;
        let docs = existing(&dbs, db, collection)?;
        let mut seen: Vec<JsonValue> = Vec::new();
        for value in docs
            .iter()
            .filter(|d| matches_query(d, filter))
            .filter_map(|d| lookup_path(d, field))
        {
            if !seen.contains(value) {
                seen.push(value.clone());
            }
        }
        Ok(seen)
    }

    /// Document counts per value of a field, largest group first. Missing
    /// fields group under `null`. With `sum_field`, each row also carries the
    /// sum of that field's numeric values.
    pub fn group_by(
        &self,
        db: &str,
        collection: &str,
        field: &str,
        sum_field: Option<&str>,
    ) -> StoreResult<Vec<GroupRow>> {
        let dbs = self.read()?;
        let docs = existing(&dbs, db, collection)?;
        let mut groups: Vec<(JsonValue, u64, f64)> = Vec::new();
        for doc in docs {
            let key = lookup_path(doc, field).cloned().unwrap_or(JsonValue::Null);
            let amount = sum_field
                .and_then(|f| lookup_path(doc, f))
                .and_then(JsonValue::as_f64)
                .unwrap_or(0.0);
            match groups.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, n, total)) => {
                    *n += 1;
                    *total += amount;
                }
                None => groups.push((key, 1, amount)),
            }
        }
        groups.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(groups
            .into_iter()
            .map(|(key, count, total)| GroupRow {
                key,
                count,
                total: sum_field.map(|_| number(total)),
            })
            .collect())
    }

    /// Documents with any string value containing `text`, case-insensitively.
    pub fn text_search(
        &self,
        db: &str,
        collection: &str,
        text: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        let dbs = self.read()?;
        let docs = existing(&dbs, db, collection)?;
        let needle = text.to_lowercase();
        Ok(docs
            .iter()
            .filter(|d| d.values().any(|v| contains_text(v, &needle)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

fn lookup<'a>(
    dbs: &'a BTreeMap<String, Collections>,
    db: &str,
    collection: &str,
) -> Option<&'a Vec<Document>> {
    dbs.get(db).and_then(|colls| colls.get(collection))
}

fn existing<'a>(
    dbs: &'a BTreeMap<String, Collections>,
    db: &str,
    collection: &str,
) -> StoreResult<&'a Vec<Document>> {
    dbs.get(db)
        .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?
        .get(collection)
        .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
}

fn existing_mut<'a>(
    dbs: &'a mut BTreeMap<String, Collections>,
    db: &str,
    collection: &str,
) -> StoreResult<&'a mut Vec<Document>> {
    dbs.get_mut(db)
        .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?
        .get_mut(collection)
        .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
}

fn doc_size(doc: &Document) -> u64 {
    serde_json::to_vec(doc).map(|v| v.len() as u64).unwrap_or(0)
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

fn collection_stats(name: &str, docs: &[Document]) -> CollectionStats {
    let size: u64 = docs.iter().map(doc_size).sum();
    CollectionStats {
        name: name.to_string(),
        count: docs.len() as u64,
        size,
        avg_obj_size: average(size, docs.len() as u64),
    }
}

/// Resolve a dotted path such as `address.city`.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a JsonValue> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Equality match on every (dotted) field of the query.
pub fn matches_query(doc: &Document, query: &Document) -> bool {
    query
        .iter()
        .all(|(path, expected)| lookup_path(doc, path) == Some(expected))
}

fn contains_text(value: &JsonValue, needle: &str) -> bool {
    match value {
        JsonValue::String(s) => s.to_lowercase().contains(needle),
        JsonValue::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        JsonValue::Object(map) => map.values().any(|v| contains_text(v, needle)),
        _ => false,
    }
}

enum UpdateOp {
    Set(String, JsonValue),
    Unset(String),
    Inc(String, f64),
}

fn parse_update(update: &Document) -> StoreResult<Vec<UpdateOp>> {
    if !update.keys().any(|k| k.starts_with('$')) {
        return Ok(update
            .iter()
            .filter(|(k, _)| k.as_str() != "_id")
            .map(|(k, v)| UpdateOp::Set(k.clone(), v.clone()))
            .collect());
    }

    let mut ops = Vec::new();
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| StoreError::InvalidDocument(format!("{} expects an object", op)))?;
        for (path, value) in fields {
            if path == "_id" {
                return Err(StoreError::InvalidDocument("_id cannot be modified".to_string()));
            }
            match op.as_str() {
                "$set" => ops.push(UpdateOp::Set(path.clone(), value.clone())),
                "$unset" => ops.push(UpdateOp::Unset(path.clone())),
                "$inc" => {
                    let by = value.as_f64().ok_or_else(|| {
                        StoreError::InvalidDocument(format!("$inc on '{}' needs a number", path))
                    })?;
                    ops.push(UpdateOp::Inc(path.clone(), by));
                }
                other => {
                    return Err(StoreError::InvalidDocument(format!(
                        "unsupported update operator '{}'",
                        other
                    )))
                }
            }
        }
    }
    Ok(ops)
}

fn apply(doc: &mut Document, op: &UpdateOp) -> StoreResult<()> {
    match op {
        UpdateOp::Set(path, value) => set_path(doc, path, value.clone()),
        UpdateOp::Unset(path) => {
            remove_path(doc, path);
            Ok(())
        }
        UpdateOp::Inc(path, by) => {
            let next = match lookup_path(doc, path) {
                None | Some(JsonValue::Null) => number(*by),
                Some(JsonValue::Number(n)) => match (n.as_i64(), by.fract() == 0.0) {
                    (Some(i), true) => match i.checked_add(*by as i64) {
                        Some(sum) => JsonValue::from(sum),
                        None => {
                            return Err(StoreError::InvalidDocument(format!(
                                "$inc on '{}' overflows a 64-bit integer",
                                path
                            )))
                        }
                    },
                    _ => number(n.as_f64().unwrap_or(0.0) + by),
                },
                Some(_) => {
                    return Err(StoreError::InvalidDocument(format!(
                        "cannot $inc non-numeric field '{}'",
                        path
                    )))
                }
            };
            set_path(doc, path, next)
        }
    }
}

fn number(f: f64) -> JsonValue {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        JsonValue::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn set_path(doc: &mut Document, path: &str, value: JsonValue) -> StoreResult<()> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop().unwrap_or(path);
    let mut current = doc;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            StoreError::InvalidDocument(format!("'{}' in '{}' is not an object", part, path))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

fn remove_path(doc: &mut Document, path: &str) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else { return };
    let mut current = doc;
    for part in parts {
        match current.get_mut(part).and_then(|v| v.as_object_mut()) {
            Some(next) => current = next,
            None => return,
        }
    }
    current.remove(last);
}
