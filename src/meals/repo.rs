use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error};

use super::repo_types::{DayMeals, DayRecord, StoredDay};
use crate::error::StoreError;
use crate::storage::{Document, DocumentStore};

pub const MEALS_COLLECTION: &str = "meals";

/// Per-date async locks, so writes to one day run one after another.
/// An entry lives only while some task holds or waits on it.
#[derive(Default)]
struct DateLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DateLocks {
    async fn acquire(&self, date: &str) -> DateGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(date.to_string()).or_default().clone()
        };
        DateGuard {
            locks: self,
            date: date.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

struct DateGuard<'a> {
    locks: &'a DateLocks,
    date: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DateGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if map.get(&self.date).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(&self.date);
        }
    }
}

/// Daily meal records keyed by `YYYY-MM-DD`.
#[derive(Clone)]
pub struct DailyMealStore {
    store: Arc<dyn DocumentStore>,
    locks: Arc<DateLocks>,
}

fn decode(doc: Document) -> Result<DayRecord, StoreError> {
    let stored: StoredDay = serde_json::from_value(doc.data).map_err(|e| {
        error!(error = %e, date = %doc.id, "undecodable day record");
        StoreError::Corrupt(format!("meals/{}: {e}", doc.id))
    })?;
    Ok(DayRecord {
        date: stored.date,
        meals: stored.meals,
        version: doc.version,
        updated_at: stored.updated_at.or(Some(doc.updated_at)),
    })
}

impl DailyMealStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DateLocks::default()),
        }
    }

    /// The stored record for `date`, or `None` when nothing was saved yet.
    pub async fn get(&self, date: &str) -> Result<Option<DayRecord>, StoreError> {
        let doc = self.store.get(MEALS_COLLECTION, date).await?;
        doc.map(decode).transpose()
    }

    /// The stored record for `date`, or the empty default day.
    pub async fn get_or_default(&self, date: &str) -> Result<DayRecord, StoreError> {
        Ok(self.get(date).await?.unwrap_or_else(|| DayRecord::empty(date)))
    }

    /// Overwrites the whole record for `date`. Last write wins: a concurrent
    /// save to the same date silently replaces this one or is replaced by it.
    pub async fn put(&self, date: &str, meals: DayMeals) -> Result<DayRecord, StoreError> {
        let _guard = self.locks.acquire(date).await;
        self.write(date, meals, None).await
    }

    /// Runs a read-modify-write on one day while holding that day's lock.
    ///
    /// The write is conditional on the version that was read, and on
    /// `expected_version` when the caller supplies one.
    pub async fn modify<T, F>(
        &self,
        date: &str,
        expected_version: Option<i64>,
        f: F,
    ) -> Result<(DayRecord, T), StoreError>
    where
        F: FnOnce(&mut DayMeals) -> Result<T, StoreError>,
    {
        let _guard = self.locks.acquire(date).await;

        let mut record = self.get_or_default(date).await?;
        if let Some(expected) = expected_version {
            if expected != record.version {
                debug!(date, expected, stored = record.version, "stale day version");
                return Err(StoreError::conflict(MEALS_COLLECTION, date));
            }
        }
        let out = f(&mut record.meals)?;
        let saved = self.write(date, record.meals, Some(record.version)).await?;
        Ok((saved, out))
    }

    async fn write(
        &self,
        date: &str,
        meals: DayMeals,
        expected_version: Option<i64>,
    ) -> Result<DayRecord, StoreError> {
        let stored = StoredDay {
            date: date.to_string(),
            meals,
            updated_at: Some(OffsetDateTime::now_utc()),
        };
        let data = serde_json::to_value(&stored)?;
        let doc = self
            .store
            .put(MEALS_COLLECTION, date, data, expected_version)
            .await?;
        debug!(date, version = doc.version, "day saved");
        decode(doc)
    }

    /// Stored days with keys in `[start, end]`, ascending.
    pub async fn get_range(&self, start: &str, end: &str) -> Result<Vec<DayRecord>, StoreError> {
        let docs = self.store.range(MEALS_COLLECTION, start, end).await?;
        let mut days = docs.into_iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        days.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(days)
    }
}
