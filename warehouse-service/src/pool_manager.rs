//! Warehouse connection pool manager.
//!
//! Holds at most one pooled session per logical database key. Sessions are
//! opened lazily on first use and shared by every request until
//! [`PoolManager::release_all`] drops them.

use std::collections::HashMap;
use std::sync::Arc;

use common::config::{DatabaseConfig, DatabaseRegistry, PoolSettings};
use common::errors::{AppError, AppResult};
use tokio::sync::{OnceCell, RwLock};

use crate::warehouse::{WarehouseConnector, WarehouseSession};

/// Slot for one key. Filled once the first connect succeeds.
type SessionSlot = Arc<OnceCell<Arc<dyn WarehouseSession>>>;

/// Manages warehouse connection pools.
pub struct PoolManager {
    databases: DatabaseRegistry,
    connector: Arc<dyn WarehouseConnector>,
    settings: PoolSettings,
    /// Session slots indexed by logical key. The map lock is never held
    /// across a connect.
    pools: RwLock<HashMap<String, SessionSlot>>,
}

impl PoolManager {
    pub fn new(
        databases: DatabaseRegistry,
        connector: Arc<dyn WarehouseConnector>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            databases,
            connector,
            settings,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Resolved connection parameters of `key`.
    pub fn resolve(&self, key: &str) -> AppResult<DatabaseConfig> {
        self.databases.resolve(key)
    }

    /// Returns the session for `key`, opening it on first use.
    ///
    /// Concurrent first calls for the same key open a single session;
    /// callers of other keys are not held up by a connect in flight.
    ///
    /// # Errors
    /// `UnknownDatabaseKey` before any connection attempt, or
    /// `ConnectionFailure` when the warehouse cannot be reached.
    pub async fn acquire(&self, key: &str) -> AppResult<Arc<dyn WarehouseSession>> {
        if let Some(session) = self.pools.read().await.get(key).and_then(|slot| slot.get()) {
            return Ok(Arc::clone(session));
        }

        let config = self.databases.resolve(key)?;
        let slot = Arc::clone(self.pools.write().await.entry(key.to_string()).or_default());

        // A failed connect leaves the slot empty so the next caller retries.
        let session = slot
            .get_or_try_init(|| async {
                let session = self
                    .connector
                    .connect(&config, &self.settings)
                    .await
                    .map_err(|e| {
                        tracing::warn!(key, database = %config.database, error = %e, "Warehouse connection failed");
                        AppError::ConnectionFailure {
                            key: key.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                tracing::info!(key, database = %config.database, "Warehouse pool opened");
                Ok::<_, AppError>(session)
            })
            .await?;
        Ok(Arc::clone(session))
    }

    /// Closes and forgets every open session. Returns how many were closed.
    pub async fn release_all(&self) -> usize {
        let drained: Vec<_> = self.pools.write().await.drain().collect();

        let mut count = 0;
        for (key, slot) in drained {
            if let Some(session) = slot.get() {
                session.close().await;
                tracing::info!(key = %key, "Warehouse pool closed");
                count += 1;
            }
        }
        count
    }

    /// Number of open sessions.
    pub async fn connection_count(&self) -> usize {
        self.pools
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }
}
