//! 数仓浏览服务路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

/// 创建数仓浏览路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/databases", get(list_databases))
        .route("/api/databases/info", get(databases_info))
        .route("/api/databases/{key}/test", get(test_connection))
        .route("/api/databases/{key}/schemas", get(list_schemas))
        .route("/api/databases/{key}/tables", get(list_tables))
        .route(
            "/api/databases/{key}/schemas/{schema}/tables",
            get(list_schema_tables),
        )
        .route("/api/databases/{key}/tables/{table}/info", get(table_info))
        .route(
            "/api/databases/{key}/schemas/{schema}/tables/{table}/info",
            get(schema_table_info),
        )
        .route("/api/databases/{key}/data/{table}", get(table_data))
        .route(
            "/api/databases/{key}/schemas/{schema}/data/{table}",
            get(schema_table_data),
        )
        // 兼容旧接口，绑定默认库
        .route("/api/tables", get(legacy_tables))
        .route("/api/tables/{table}/info", get(legacy_table_info))
        .route("/api/data/{table}", get(legacy_table_data))
        .route("/api/clear-cache", post(clear_cache))
        .route("/api/health", get(health_check))
}
