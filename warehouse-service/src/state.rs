//! Application state for warehouse service.

use std::sync::Arc;

use common::config::{AppConfig, DatabaseRegistry};

use crate::cache::MetadataCache;
use crate::executor::QueryExecutor;
use crate::pool_manager::PoolManager;
use crate::warehouse::WarehouseConnector;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool_manager: Arc<PoolManager>,
    pub metadata: Arc<MetadataCache>,
    pub executor: Arc<QueryExecutor>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        config: AppConfig,
        databases: DatabaseRegistry,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        let pool_manager = Arc::new(PoolManager::new(
            databases,
            connector,
            config.pool_settings(),
        ));
        let metadata = Arc::new(MetadataCache::new(
            Arc::clone(&pool_manager),
            config.cache_ttl(),
            config.cache_max_entries,
        ));
        let executor = Arc::new(QueryExecutor::new(Arc::clone(&pool_manager)));

        Self {
            config,
            pool_manager,
            metadata,
            executor,
        }
    }
}
