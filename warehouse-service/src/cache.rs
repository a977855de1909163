//! Metadata cache.
//!
//! Discovery results (connectivity, databases, schemas, tables) are memoized
//! per argument tuple for a bounded time. Failures are never stored, so the
//! next call after an error goes back to the warehouse. Concurrent misses on
//! the same argument tuple share one warehouse round trip.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use common::config::DEFAULT_DATABASE_KEY;
use common::errors::DiscoveryError;
use common::models::{DatabaseRef, SchemaRef, TableRef};
use moka::future::Cache;

use crate::pool_manager::PoolManager;
use crate::warehouse::{WarehouseError, WarehouseSession};

type TablesKey = (String, Option<String>);

/// Memoized discovery operations.
pub struct MetadataCache {
    pools: Arc<PoolManager>,
    connectivity: Cache<String, bool>,
    databases: Cache<(), Vec<DatabaseRef>>,
    schemas: Cache<String, Vec<SchemaRef>>,
    tables: Cache<TablesKey, Vec<TableRef>>,
}

impl MetadataCache {
    pub fn new(pools: Arc<PoolManager>, ttl: Duration, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1) as u64;
        Self {
            pools,
            connectivity: bounded(ttl, max_entries),
            databases: bounded(ttl, 1),
            schemas: bounded(ttl, max_entries),
            tables: bounded(ttl, max_entries),
        }
    }

    /// Round-trips a trivial query through `key`'s session.
    pub async fn test_connection(&self, key: &str) -> Result<bool, DiscoveryError> {
        self.connectivity
            .try_get_with(key.to_string(), async {
                let session = self.session(key).await?;
                session
                    .ping()
                    .await
                    .map_err(|e| query_failed("test connection", key, e))?;
                Ok::<_, DiscoveryError>(true)
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }

    /// Every database visible to the `default` key's session.
    pub async fn discover_databases(&self) -> Result<Vec<DatabaseRef>, DiscoveryError> {
        self.databases
            .try_get_with((), async {
                let session = self.session(DEFAULT_DATABASE_KEY).await?;
                let databases: Vec<DatabaseRef> = session
                    .list_databases()
                    .await
                    .map_err(|e| query_failed("list databases", DEFAULT_DATABASE_KEY, e))?
                    .iter()
                    .map(|name| DatabaseRef::from_warehouse_name(name))
                    .collect();
                Ok::<_, DiscoveryError>(databases)
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }

    /// Schemas of `key`'s database.
    pub async fn list_schemas(&self, key: &str) -> Result<Vec<SchemaRef>, DiscoveryError> {
        self.schemas
            .try_get_with(key.to_string(), async {
                let session = self.session(key).await?;
                let schemas: Vec<SchemaRef> = session
                    .list_schemas()
                    .await
                    .map_err(|e| query_failed("list schemas", key, e))?
                    .into_iter()
                    .map(SchemaRef::new)
                    .collect();
                Ok::<_, DiscoveryError>(schemas)
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }

    /// Tables of `schema`, or of `key`'s default schema when absent.
    pub async fn list_tables(
        &self,
        key: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TableRef>, DiscoveryError> {
        let cache_key = (key.to_string(), schema.map(str::to_string));
        self.tables
            .try_get_with(cache_key, async {
                let config = self
                    .pools
                    .resolve(key)
                    .map_err(|e| DiscoveryError::from_acquire(key, e))?;
                let schema_name = schema.unwrap_or(&config.schema);

                let session = self.session(key).await?;
                let tables: Vec<TableRef> = session
                    .list_tables(schema_name)
                    .await
                    .map_err(|e| query_failed("list tables", key, e))?
                    .into_iter()
                    .map(TableRef::new)
                    .collect();
                Ok::<_, DiscoveryError>(tables)
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }

    /// Empties every table. Returns the number of entries dropped.
    pub async fn clear(&self) -> usize {
        let dropped = invalidate(&self.connectivity).await
            + invalidate(&self.databases).await
            + invalidate(&self.schemas).await
            + invalidate(&self.tables).await;
        usize::try_from(dropped).unwrap_or(usize::MAX)
    }

    async fn session(&self, key: &str) -> Result<Arc<dyn WarehouseSession>, DiscoveryError> {
        self.pools
            .acquire(key)
            .await
            .map_err(|e| DiscoveryError::from_acquire(key, e))
    }
}

fn bounded<K, V>(ttl: Duration, max_entries: u64) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_entries)
        .time_to_live(ttl)
        .build()
}

/// Drops every entry of `cache` and returns how many were live.
async fn invalidate<K, V>(cache: &Cache<K, V>) -> u64
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // Entry counts are only exact once pending maintenance has run.
    cache.run_pending_tasks().await;
    let count = cache.entry_count();
    cache.invalidate_all();
    count
}

fn query_failed(operation: &'static str, key: &str, err: WarehouseError) -> DiscoveryError {
    DiscoveryError::Query {
        operation,
        key: key.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::memory::MemoryWarehouse;
    use common::config::{DatabaseRegistry, PoolSettings};

    fn metadata(warehouse: &MemoryWarehouse, ttl: Duration) -> MetadataCache {
        metadata_bounded(warehouse, ttl, 64)
    }

    fn metadata_bounded(
        warehouse: &MemoryWarehouse,
        ttl: Duration,
        max_entries: usize,
    ) -> MetadataCache {
        let registry = DatabaseRegistry::from_lookup(|name| match name {
            "WAREHOUSE_DATABASE" => Some("LLM_EVAL".into()),
            "WAREHOUSE_SCHEMA" => Some("PUBLIC".into()),
            _ => None,
        })
        .unwrap();
        let pools = PoolManager::new(
            registry,
            Arc::new(warehouse.clone()),
            PoolSettings::default(),
        );
        MetadataCache::new(Arc::new(pools), ttl, max_entries)
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_millis(50));

        cache.list_schemas("default").await.unwrap();
        cache.list_schemas("default").await.unwrap();
        assert_eq!(warehouse.metadata_calls(), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        cache.list_schemas("default").await.unwrap();
        assert_eq!(warehouse.metadata_calls(), 2);
    }

    #[tokio::test]
    async fn test_size_bound_holds() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata_bounded(&warehouse, Duration::from_secs(60), 1);

        for schema in ["PUBLIC", "OTHER", "ARCHIVE"] {
            cache.list_tables("default", Some(schema)).await.unwrap();
        }
        cache.tables.run_pending_tasks().await;
        assert!(cache.tables.entry_count() <= 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_lookup() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_secs(60));
        warehouse.set_catalog_delay(Duration::from_millis(50));

        let (a, b) = tokio::join!(cache.list_schemas("default"), cache.list_schemas("default"));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(warehouse.metadata_calls(), 1);
        assert_eq!(warehouse.connects(), 1);
    }

    #[tokio::test]
    async fn test_discovery_is_memoized() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_secs(60));

        let first = cache.list_tables("default", None).await.unwrap();
        let second = cache.list_tables("default", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            ["USERS", "ORDERS"]
        );
        assert_eq!(first[0].key, "users");
        assert_eq!(warehouse.metadata_calls(), 1);

        // A different argument tuple is a different entry.
        cache.list_tables("default", Some("PUBLIC")).await.unwrap();
        assert_eq!(warehouse.metadata_calls(), 2);

        assert!(cache.test_connection("default").await.unwrap());
        assert!(cache.test_connection("default").await.unwrap());
        assert_eq!(warehouse.metadata_calls(), 3);
    }

    #[tokio::test]
    async fn test_clear_forces_fresh_lookup() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_secs(60));

        cache.list_schemas("default").await.unwrap();
        cache.discover_databases().await.unwrap();
        assert_eq!(cache.clear().await, 2);

        cache.list_schemas("default").await.unwrap();
        assert_eq!(warehouse.metadata_calls(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_secs(60));

        warehouse.set_fail_queries(true);
        let err = cache.list_schemas("default").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Query { operation: "list schemas", .. }));

        warehouse.set_fail_queries(false);
        let schemas = cache.list_schemas("default").await.unwrap();
        assert_eq!(schemas, vec![SchemaRef::new("PUBLIC")]);
    }

    #[tokio::test]
    async fn test_unknown_key_is_reported() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_secs(60));

        assert_eq!(
            cache.test_connection("missing").await,
            Err(DiscoveryError::UnknownDatabaseKey("missing".into()))
        );
        assert_eq!(
            cache.list_tables("missing", None).await,
            Err(DiscoveryError::UnknownDatabaseKey("missing".into()))
        );
        assert_eq!(warehouse.connects(), 0);
    }

    #[tokio::test]
    async fn test_discover_databases_uses_default_session() {
        let warehouse = MemoryWarehouse::sample();
        let cache = metadata(&warehouse, Duration::from_secs(60));

        let databases = cache.discover_databases().await.unwrap();
        assert_eq!(
            databases,
            vec![
                DatabaseRef::from_warehouse_name("ANALYTICS"),
                DatabaseRef::from_warehouse_name("llm_eval"),
            ]
        );
        assert_eq!(databases[1].key, "llm_eval");
        assert_eq!(databases[1].name, "LLM_EVAL");
    }
}
