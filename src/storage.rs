use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

/// A JSON document as held by a store.
///
/// `version` starts at 1 on first write and grows by one on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// String-keyed JSON documents grouped in named collections.
///
/// Keys compare bytewise, so ISO dates used as keys sort chronologically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Writes the whole document.
    ///
    /// With `expected_version = None` the write is unconditional. With
    /// `Some(v)` it only succeeds when the stored version is `v`, where 0
    /// means the document must not exist yet; otherwise `Conflict`.
    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<i64>,
    ) -> Result<Document, StoreError>;

    /// Stores a new document under a store-assigned id.
    async fn insert(&self, collection: &str, data: Value) -> Result<Document, StoreError>;

    /// Shallow-merges the top-level fields of `fields` into an existing document.
    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<Document, StoreError>;

    /// Removes a document. Removing an absent document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Every document of the collection, ordered by key.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Documents whose key lies in `[start, end]`, ordered by key.
    async fn range(&self, collection: &str, start: &str, end: &str) -> Result<Vec<Document>, StoreError>;
}

pub(crate) fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn merge_fields(target: &mut Value, fields: Value) -> Result<(), StoreError> {
    let (Value::Object(target), Value::Object(fields)) = (target, fields) else {
        return Err(StoreError::Corrupt("merge expects JSON objects".into()));
    };
    for (k, v) in fields {
        target.insert(k, v);
    }
    Ok(())
}

/// Process-local store, used by tests and `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<i64>,
    ) -> Result<Document, StoreError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        let now = OffsetDateTime::now_utc();
        let current = docs.get(id);
        let stored_version = current.map(|d| d.version).unwrap_or(0);

        if let Some(expected) = expected_version {
            if expected != stored_version {
                debug!(collection, id, expected, stored_version, "version mismatch");
                return Err(StoreError::conflict(collection, id));
            }
        }

        let doc = Document {
            id: id.to_string(),
            data,
            version: stored_version + 1,
            created_at: current.map(|d| d.created_at).unwrap_or(now),
            updated_at: now,
        };
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn insert(&self, collection: &str, data: Value) -> Result<Document, StoreError> {
        let id = new_document_id();
        self.put(collection, &id, data, Some(0)).await
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<Document, StoreError> {
        let mut guard = self.collections.write().await;
        let doc = guard
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge_fields(&mut doc.data, fields)?;
        doc.version += 1;
        doc.updated_at = OffsetDateTime::now_utc();
        Ok(doc.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut guard = self.collections.write().await;
        if let Some(docs) = guard.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn range(&self, collection: &str, start: &str, end: &str) -> Result<Vec<Document>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|c| {
                c.range(start.to_string()..=end.to_string())
                    .map(|(_, d)| d.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
