use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error};

use super::dto::DishUpdate;
use super::repo_types::{collate_names, DishCatalogItem, StoredDish, StoredDishPatch};
use crate::error::StoreError;
use crate::storage::{Document, DocumentStore};

pub const DISH_DB_COLLECTION: &str = "dishDatabase";

/// The dish catalog backing the name autocomplete.
#[derive(Clone)]
pub struct DishCatalogStore {
    store: Arc<dyn DocumentStore>,
}

fn decode(doc: Document) -> Result<DishCatalogItem, StoreError> {
    let stored: StoredDish = serde_json::from_value(doc.data).map_err(|e| {
        error!(error = %e, id = %doc.id, "undecodable catalog entry");
        StoreError::Corrupt(format!("{DISH_DB_COLLECTION}/{}: {e}", doc.id))
    })?;
    Ok(DishCatalogItem {
        id: doc.id,
        name: stored.name,
        calories_per_100g: stored.calories_per_100g,
    })
}

impl DishCatalogStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Every catalog entry, sorted by name.
    pub async fn list_all(&self) -> Result<Vec<DishCatalogItem>, StoreError> {
        let docs = self.store.list(DISH_DB_COLLECTION).await?;
        let mut items = docs.into_iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        items.sort_by(|a, b| collate_names(&a.name, &b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Entries whose name contains `query`, ignoring case, in list order.
    pub async fn search(&self, query: &str) -> Result<Vec<DishCatalogItem>, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.list_all().await?;
        Ok(items
            .into_iter()
            .filter(|d| d.name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Adds an entry and returns its store-assigned id.
    pub async fn add(&self, name: &str, calories_per_100g: Option<f64>) -> Result<String, StoreError> {
        let stored = StoredDish {
            name: name.to_string(),
            calories_per_100g,
            created_at: Some(OffsetDateTime::now_utc()),
            updated_at: None,
        };
        let doc = self
            .store
            .insert(DISH_DB_COLLECTION, serde_json::to_value(&stored)?)
            .await?;
        debug!(id = %doc.id, name, "catalog entry added");
        Ok(doc.id)
    }

    /// Merges the provided fields into an existing entry.
    pub async fn update(&self, id: &str, update: DishUpdate) -> Result<DishCatalogItem, StoreError> {
        let patch = StoredDishPatch {
            name: update.name,
            calories_per_100g: update.calories_per_100g,
            updated_at: OffsetDateTime::now_utc(),
        };
        let doc = self
            .store
            .merge(DISH_DB_COLLECTION, id, serde_json::to_value(&patch)?)
            .await?;
        decode(doc)
    }

    /// Removes an entry; removing a missing entry is not an error.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(DISH_DB_COLLECTION, id).await
    }
}
