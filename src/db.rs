use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::storage::{new_document_id, Document, DocumentStore};

/// Row of the `documents` table.
#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    data: Value,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Self {
            id: r.id,
            data: r.data,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const COLUMNS: &str = "id, data, version, created_at, updated_at";

/// Document store backed by a Postgres JSONB table.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    async fn insert_new(
        &self,
        op: &'static str,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let query = format!(
            "INSERT INTO documents (collection, id, data) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DocumentRow>(&query)
            .bind(collection)
            .bind(id)
            .bind(data)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| log_failure(op, collection, e.into()))?
            .map(Document::from)
            .ok_or_else(|| StoreError::conflict(collection, id))
    }
}

fn log_failure(op: &'static str, collection: &str, e: StoreError) -> StoreError {
    error!(error = %e, op, collection, "document store call failed");
    e
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE collection = $1 AND id = $2");
        let row = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| log_failure("get", collection, e.into()))?;
        Ok(row.map(Document::from))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        expected_version: Option<i64>,
    ) -> Result<Document, StoreError> {
        debug!(collection, id, ?expected_version, "put document");
        match expected_version {
            None => {
                let query = format!(
                    "INSERT INTO documents (collection, id, data) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (collection, id) DO UPDATE \
                        SET data = EXCLUDED.data, \
                            version = documents.version + 1, \
                            updated_at = now() \
                     RETURNING {COLUMNS}"
                );
                let row = sqlx::query_as::<_, DocumentRow>(&query)
                    .bind(collection)
                    .bind(id)
                    .bind(data)
                    .fetch_one(&self.db)
                    .await
                    .map_err(|e| log_failure("put", collection, e.into()))?;
                Ok(row.into())
            }
            Some(0) => self.insert_new("put", collection, id, data).await,
            Some(expected) => {
                let query = format!(
                    "UPDATE documents \
                        SET data = $3, version = version + 1, updated_at = now() \
                      WHERE collection = $1 AND id = $2 AND version = $4 \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, DocumentRow>(&query)
                    .bind(collection)
                    .bind(id)
                    .bind(data)
                    .bind(expected)
                    .fetch_optional(&self.db)
                    .await
                    .map_err(|e| log_failure("put", collection, e.into()))?
                    .map(Document::from)
                    .ok_or_else(|| StoreError::conflict(collection, id))
            }
        }
    }

    async fn insert(&self, collection: &str, data: Value) -> Result<Document, StoreError> {
        let id = new_document_id();
        self.insert_new("insert", collection, &id, data).await
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<Document, StoreError> {
        if !fields.is_object() {
            return Err(StoreError::Corrupt("merge expects a JSON object".into()));
        }
        let query = format!(
            "UPDATE documents \
                SET data = data || $3, version = version + 1, updated_at = now() \
              WHERE collection = $1 AND id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DocumentRow>(&query)
            .bind(collection)
            .bind(id)
            .bind(fields)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| log_failure("merge", collection, e.into()))?
            .map(Document::from)
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| log_failure("delete", collection, e.into()))?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents WHERE collection = $1 ORDER BY id COLLATE \"C\""
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(collection)
            .fetch_all(&self.db)
            .await
            .map_err(|e| log_failure("list", collection, e.into()))?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn range(&self, collection: &str, start: &str, end: &str) -> Result<Vec<Document>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents \
              WHERE collection = $1 \
                AND id COLLATE \"C\" >= $2 \
                AND id COLLATE \"C\" <= $3 \
              ORDER BY id COLLATE \"C\""
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(collection)
            .bind(start)
            .bind(end)
            .fetch_all(&self.db)
            .await
            .map_err(|e| log_failure("range", collection, e.into()))?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}
