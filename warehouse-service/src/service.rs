//! 数仓浏览服务模块
//!
//! 元数据发现失败时降级为空结果（或回退条目），表结构与表数据的错误原样返回。

use std::sync::Arc;

use async_trait::async_trait;
use common::config::DEFAULT_DATABASE_KEY;
use common::errors::AppResult;
use common::models::{
    ClearCacheResponse, ConnectionStatus, DataQuery, DatabaseRef, DatabaseStatus, SchemaRef,
    TableDataResponse, TableInfo, TableRef,
};

use crate::cache::MetadataCache;
use crate::executor::{PageRequest, QueryExecutor};
use crate::pool_manager::PoolManager;
use crate::state::AppState;

/// 数仓浏览服务 Trait
#[async_trait]
pub trait ExplorerServiceTrait: Send + Sync {
    /// 列出数仓中的数据库，失败时返回默认库的回退条目
    async fn databases(&self) -> Vec<DatabaseRef>;

    /// 列出数据库及其连接状态
    async fn databases_info(&self) -> Vec<DatabaseStatus>;

    /// 测试连接，任何失败都视为 false
    async fn test(&self, key: &str) -> bool;

    /// 列出 schema，失败时返回空列表
    async fn schemas(&self, key: &str) -> Vec<SchemaRef>;

    /// 列出表，失败时返回空列表
    async fn tables(&self, key: &str, schema: Option<&str>) -> Vec<TableRef>;

    /// 获取表结构
    async fn table_info(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
    ) -> AppResult<TableInfo>;

    /// 分页读取表数据
    async fn table_data(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
        query: &DataQuery,
    ) -> AppResult<TableDataResponse>;

    /// 清空元数据缓存并释放所有连接池
    async fn clear_cache(&self) -> ClearCacheResponse;
}

/// 数仓浏览服务
pub struct ExplorerService {
    pool_manager: Arc<PoolManager>,
    metadata: Arc<MetadataCache>,
    executor: Arc<QueryExecutor>,
    max_page_limit: u32,
}

impl ExplorerService {
    /// 基于应用状态创建服务实例
    pub fn new(state: &AppState) -> Self {
        Self {
            pool_manager: Arc::clone(&state.pool_manager),
            metadata: Arc::clone(&state.metadata),
            executor: Arc::clone(&state.executor),
            max_page_limit: state.config.max_page_limit,
        }
    }

    fn fallback_databases(&self) -> Vec<DatabaseRef> {
        let database = self
            .pool_manager
            .resolve(DEFAULT_DATABASE_KEY)
            .map(|c| c.database)
            .unwrap_or_default();
        vec![DatabaseRef::for_logical_key(DEFAULT_DATABASE_KEY, &database)]
    }
}

#[async_trait]
impl ExplorerServiceTrait for ExplorerService {
    async fn databases(&self) -> Vec<DatabaseRef> {
        match self.metadata.discover_databases().await {
            Ok(databases) => databases,
            Err(e) => {
                tracing::warn!(error = %e, "数据库列表获取失败，使用默认配置");
                self.fallback_databases()
            }
        }
    }

    async fn databases_info(&self) -> Vec<DatabaseStatus> {
        let mut statuses = Vec::new();
        for db in self.databases().await {
            let connected = self.test(&db.key).await;
            statuses.push(DatabaseStatus {
                key: db.key,
                name: db.name,
                database: db.database,
                status: ConnectionStatus::from(connected),
            });
        }
        statuses
    }

    async fn test(&self, key: &str) -> bool {
        match self.metadata.test_connection(key).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(key, error = %e, "连接测试失败");
                false
            }
        }
    }

    async fn schemas(&self, key: &str) -> Vec<SchemaRef> {
        self.metadata.list_schemas(key).await.unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "schema 列表获取失败");
            Vec::new()
        })
    }

    async fn tables(&self, key: &str, schema: Option<&str>) -> Vec<TableRef> {
        self.metadata
            .list_tables(key, schema)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(key, schema, error = %e, "表列表获取失败");
                Vec::new()
            })
    }

    async fn table_info(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
    ) -> AppResult<TableInfo> {
        self.executor.describe(key, table, schema).await
    }

    async fn table_data(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
        query: &DataQuery,
    ) -> AppResult<TableDataResponse> {
        query.check(self.max_page_limit)?;

        let page = PageRequest {
            limit: query.limit,
            offset: query.offset,
            search: &query.search,
        };
        let slice = self.executor.fetch(key, table, schema, page).await?;
        Ok(TableDataResponse::new(table, key, schema, query, slice))
    }

    async fn clear_cache(&self) -> ClearCacheResponse {
        // Closing waits for in-flight catalog calls, so their results are
        // dropped by the clear that follows.
        let released_connections = self.pool_manager.release_all().await;
        let cleared_entries = self.metadata.clear().await;
        tracing::info!(cleared_entries, released_connections, "缓存已清空");

        ClearCacheResponse {
            message: "Cache cleared".to_string(),
            released_connections,
            cleared_entries,
        }
    }
}
