use std::sync::Arc;

use crate::assessment::Assessment;
use crate::config::Config;
use crate::content::{ContentService, LlmProvider};
use crate::db::{CachedStore, MemoryStore, PgStore, Store, StoreError};
use crate::tutor::TutorAgent;

/// Shared handles for one process: store, content service and configuration.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    content: Arc<dyn ContentService>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, content: Arc<dyn ContentService>, config: Config) -> Self {
        Self {
            store,
            content,
            config: Arc::new(config),
        }
    }

    /// Postgres behind the read-through cache when `DATABASE_URL` is set,
    /// otherwise an empty in-memory store.
    pub async fn from_config(config: Config) -> Result<Self, StoreError> {
        let backing: Arc<dyn Store> = match config.database_url.as_deref() {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        let store: Arc<dyn Store> = Arc::new(CachedStore::new(backing));
        let content: Arc<dyn ContentService> = Arc::new(LlmProvider::from_env());
        Ok(Self::new(store, content, config))
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    pub fn content(&self) -> Arc<dyn ContentService> {
        Arc::clone(&self.content)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tutor(&self) -> TutorAgent {
        TutorAgent::new(self.store(), self.content(), self.config.tutor.clone())
    }

    pub fn assessment(&self) -> Assessment {
        Assessment::new(self.store(), self.config.assessment.clone(), self.config.tutor.bkt)
    }
}
