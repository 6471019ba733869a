use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{AppConfig, StoreBackend};
use crate::db::PgStore;
use crate::dishes::repo::DishCatalogStore;
use crate::meals::repo::DailyMealStore;
use crate::storage::{DocumentStore, MemoryStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dishes: DishCatalogStore,
    pub meals: DailyMealStore,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL not set")?;
                let pg = PgStore::connect(url, config.db_max_connections).await?;

                if let Err(e) = sqlx::migrate!("./migrations").run(pg.pool()).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(pg)
            }
            StoreBackend::Memory => {
                info!("using in-memory document store; data is lost on exit");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::from_parts(Arc::new(config), store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            dishes: DishCatalogStore::new(store.clone()),
            meals: DailyMealStore::new(store),
        }
    }

    /// State over a fresh in-memory store.
    pub fn fake() -> Self {
        Self::from_parts(Arc::new(AppConfig::memory()), Arc::new(MemoryStore::new()))
    }
}
