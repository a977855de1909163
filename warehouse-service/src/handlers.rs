//! Handler模块

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::config::DEFAULT_DATABASE_KEY;
use common::errors::{AppError, AppResult};
use common::models::{
    ClearCacheResponse, ConnectionTestResponse, DataQuery, DatabasesInfoResponse,
    DatabasesResponse, SchemaQuery, SchemasResponse, TableDataResponse, TableInfo,
    TablesResponse,
};
use common::response::ErrorResponse;

use crate::service::{ExplorerService, ExplorerServiceTrait};
use crate::state::AppState;

/// 查询参数解析失败统一返回 400 错误信封
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    query
        .map(|Query(q)| q)
        .map_err(|e| AppError::Validation(e.body_text()))
}

/// 列出数仓中的数据库
#[utoipa::path(
    get,
    path = "/api/databases",
    tag = "databases",
    responses(
        (status = 200, description = "数据库列表（发现失败时返回默认库）", body = DatabasesResponse)
    )
)]
pub async fn list_databases(State(state): State<AppState>) -> Json<DatabasesResponse> {
    let service = ExplorerService::new(&state);
    Json(DatabasesResponse {
        databases: service.databases().await,
    })
}

/// 列出数据库及其连接状态
#[utoipa::path(
    get,
    path = "/api/databases/info",
    tag = "databases",
    responses(
        (status = 200, description = "数据库连接状态", body = DatabasesInfoResponse)
    )
)]
pub async fn databases_info(State(state): State<AppState>) -> Json<DatabasesInfoResponse> {
    let service = ExplorerService::new(&state);
    Json(DatabasesInfoResponse {
        databases: service.databases_info().await,
    })
}

/// 测试数据库连接
#[utoipa::path(
    get,
    path = "/api/databases/{key}/test",
    tag = "databases",
    params(
        ("key" = String, Path, description = "逻辑数据库标识")
    ),
    responses(
        (status = 200, description = "连接测试结果", body = ConnectionTestResponse)
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<ConnectionTestResponse> {
    let service = ExplorerService::new(&state);
    Json(ConnectionTestResponse {
        connected: service.test(&key).await,
    })
}

/// 列出数据库中的 schema
#[utoipa::path(
    get,
    path = "/api/databases/{key}/schemas",
    tag = "metadata",
    params(
        ("key" = String, Path, description = "逻辑数据库标识")
    ),
    responses(
        (status = 200, description = "schema 列表（失败时为空）", body = SchemasResponse)
    )
)]
pub async fn list_schemas(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<SchemasResponse> {
    let service = ExplorerService::new(&state);
    Json(SchemasResponse {
        schemas: service.schemas(&key).await,
    })
}

/// 列出表（默认 schema 或查询参数指定的 schema）
#[utoipa::path(
    get,
    path = "/api/databases/{key}/tables",
    tag = "metadata",
    params(
        ("key" = String, Path, description = "逻辑数据库标识"),
        SchemaQuery
    ),
    responses(
        (status = 200, description = "表列表（失败时为空）", body = TablesResponse),
        (status = 400, description = "参数错误", body = ErrorResponse)
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    Path(key): Path<String>,
    query: Result<Query<SchemaQuery>, QueryRejection>,
) -> AppResult<Json<TablesResponse>> {
    let query = query_params(query)?;
    let service = ExplorerService::new(&state);
    Ok(Json(TablesResponse {
        tables: service.tables(&key, query.schema()).await,
    }))
}

/// 列出指定 schema 下的表
#[utoipa::path(
    get,
    path = "/api/databases/{key}/schemas/{schema}/tables",
    tag = "metadata",
    params(
        ("key" = String, Path, description = "逻辑数据库标识"),
        ("schema" = String, Path, description = "schema 名称，区分大小写")
    ),
    responses(
        (status = 200, description = "表列表（失败时为空）", body = TablesResponse)
    )
)]
pub async fn list_schema_tables(
    State(state): State<AppState>,
    Path((key, schema)): Path<(String, String)>,
) -> Json<TablesResponse> {
    let service = ExplorerService::new(&state);
    Json(TablesResponse {
        tables: service.tables(&key, Some(&schema)).await,
    })
}

/// 获取表结构
#[utoipa::path(
    get,
    path = "/api/databases/{key}/tables/{table}/info",
    tag = "metadata",
    params(
        ("key" = String, Path, description = "逻辑数据库标识"),
        ("table" = String, Path, description = "表名，区分大小写，按列表接口返回的名称传入"),
        SchemaQuery
    ),
    responses(
        (status = 200, description = "表结构", body = TableInfo),
        (status = 404, description = "数据库或表不存在", body = ErrorResponse),
        (status = 502, description = "数仓连接失败", body = ErrorResponse)
    )
)]
pub async fn table_info(
    State(state): State<AppState>,
    Path((key, table)): Path<(String, String)>,
    query: Result<Query<SchemaQuery>, QueryRejection>,
) -> AppResult<Json<TableInfo>> {
    let query = query_params(query)?;
    let service = ExplorerService::new(&state);
    Ok(Json(service.table_info(&key, &table, query.schema()).await?))
}

/// 获取指定 schema 下的表结构
#[utoipa::path(
    get,
    path = "/api/databases/{key}/schemas/{schema}/tables/{table}/info",
    tag = "metadata",
    params(
        ("key" = String, Path, description = "逻辑数据库标识"),
        ("schema" = String, Path, description = "schema 名称，区分大小写"),
        ("table" = String, Path, description = "表名，区分大小写，按列表接口返回的名称传入")
    ),
    responses(
        (status = 200, description = "表结构", body = TableInfo),
        (status = 404, description = "数据库或表不存在", body = ErrorResponse),
        (status = 502, description = "数仓连接失败", body = ErrorResponse)
    )
)]
pub async fn schema_table_info(
    State(state): State<AppState>,
    Path((key, schema, table)): Path<(String, String, String)>,
) -> AppResult<Json<TableInfo>> {
    let service = ExplorerService::new(&state);
    Ok(Json(service.table_info(&key, &table, Some(&schema)).await?))
}

/// 分页读取表数据，支持全列模糊搜索
#[utoipa::path(
    get,
    path = "/api/databases/{key}/data/{table}",
    tag = "data",
    params(
        ("key" = String, Path, description = "逻辑数据库标识"),
        ("table" = String, Path, description = "表名，区分大小写，按列表接口返回的名称传入"),
        DataQuery
    ),
    responses(
        (status = 200, description = "表数据", body = TableDataResponse),
        (status = 400, description = "参数错误", body = ErrorResponse),
        (status = 404, description = "数据库不存在或读取失败", body = ErrorResponse),
        (status = 502, description = "数仓连接失败", body = ErrorResponse)
    )
)]
pub async fn table_data(
    State(state): State<AppState>,
    Path((key, table)): Path<(String, String)>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> AppResult<Json<TableDataResponse>> {
    let query = query_params(query)?;
    let service = ExplorerService::new(&state);
    let data = service
        .table_data(&key, &table, query.schema(), &query)
        .await?;
    Ok(Json(data))
}

/// 分页读取指定 schema 下的表数据
#[utoipa::path(
    get,
    path = "/api/databases/{key}/schemas/{schema}/data/{table}",
    tag = "data",
    params(
        ("key" = String, Path, description = "逻辑数据库标识"),
        ("schema" = String, Path, description = "schema 名称，区分大小写"),
        ("table" = String, Path, description = "表名，区分大小写，按列表接口返回的名称传入"),
        DataQuery
    ),
    responses(
        (status = 200, description = "表数据", body = TableDataResponse),
        (status = 400, description = "参数错误", body = ErrorResponse),
        (status = 404, description = "数据库不存在或读取失败", body = ErrorResponse),
        (status = 502, description = "数仓连接失败", body = ErrorResponse)
    )
)]
pub async fn schema_table_data(
    State(state): State<AppState>,
    Path((key, schema, table)): Path<(String, String, String)>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> AppResult<Json<TableDataResponse>> {
    let query = query_params(query)?;
    let service = ExplorerService::new(&state);
    let data = service
        .table_data(&key, &table, Some(&schema), &query)
        .await?;
    Ok(Json(data))
}

/// 列出默认库的表（兼容旧接口）
#[utoipa::path(
    get,
    path = "/api/tables",
    tag = "legacy",
    responses(
        (status = 200, description = "默认库的表列表", body = TablesResponse)
    )
)]
pub async fn legacy_tables(State(state): State<AppState>) -> Json<TablesResponse> {
    let service = ExplorerService::new(&state);
    Json(TablesResponse {
        tables: service.tables(DEFAULT_DATABASE_KEY, None).await,
    })
}

/// 获取默认库的表结构（兼容旧接口）
#[utoipa::path(
    get,
    path = "/api/tables/{table}/info",
    tag = "legacy",
    params(
        ("table" = String, Path, description = "表名，区分大小写，按列表接口返回的名称传入"),
        SchemaQuery
    ),
    responses(
        (status = 200, description = "表结构", body = TableInfo),
        (status = 404, description = "表不存在", body = ErrorResponse)
    )
)]
pub async fn legacy_table_info(
    State(state): State<AppState>,
    Path(table): Path<String>,
    query: Result<Query<SchemaQuery>, QueryRejection>,
) -> AppResult<Json<TableInfo>> {
    let query = query_params(query)?;
    let service = ExplorerService::new(&state);
    Ok(Json(
        service
            .table_info(DEFAULT_DATABASE_KEY, &table, query.schema())
            .await?,
    ))
}

/// 分页读取默认库的表数据（兼容旧接口）
#[utoipa::path(
    get,
    path = "/api/data/{table}",
    tag = "legacy",
    params(
        ("table" = String, Path, description = "表名，区分大小写，按列表接口返回的名称传入"),
        DataQuery
    ),
    responses(
        (status = 200, description = "表数据", body = TableDataResponse),
        (status = 400, description = "参数错误", body = ErrorResponse),
        (status = 404, description = "读取失败", body = ErrorResponse)
    )
)]
pub async fn legacy_table_data(
    State(state): State<AppState>,
    Path(table): Path<String>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> AppResult<Json<TableDataResponse>> {
    let query = query_params(query)?;
    let service = ExplorerService::new(&state);
    let data = service
        .table_data(DEFAULT_DATABASE_KEY, &table, query.schema(), &query)
        .await?;
    Ok(Json(data))
}

/// 清空元数据缓存并关闭所有连接池
#[utoipa::path(
    post,
    path = "/api/clear-cache",
    tag = "maintenance",
    responses(
        (status = 200, description = "缓存已清空", body = ClearCacheResponse)
    )
)]
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    let service = ExplorerService::new(&state);
    Json(service.clear_cache().await)
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        connections: state.pool_manager.connection_count().await,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 已打开的连接池数量
    pub connections: usize,
}
