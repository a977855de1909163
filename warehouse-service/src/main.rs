//! 数仓浏览服务
//!
//! 以 HTTP 接口只读浏览云数仓，包括：
//! - 数据库、schema、表的发现（带 TTL 缓存，失败时降级）
//! - 表结构查询
//! - 分页与全列模糊搜索读取表数据
//! - 缓存清理与连接池释放

mod cache;
mod executor;
mod handlers;
mod pool_manager;
mod routes;
mod service;
mod state;
mod warehouse;

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{load_dotenv, AppConfig, DatabaseRegistry, LogFormat};
use common::middleware::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use warehouse::PgConnector;

const SERVICE_NAME: &str = "warehouse-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "数仓浏览服务 API",
        version = "0.1.0",
        description = "云数仓只读浏览服务"
    ),
    paths(
        handlers::list_databases,
        handlers::databases_info,
        handlers::test_connection,
        handlers::list_schemas,
        handlers::list_tables,
        handlers::list_schema_tables,
        handlers::table_info,
        handlers::schema_table_info,
        handlers::table_data,
        handlers::schema_table_data,
        handlers::legacy_tables,
        handlers::legacy_table_info,
        handlers::legacy_table_data,
        handlers::clear_cache,
        handlers::health_check,
    ),
    components(schemas(
        common::models::DatabaseRef,
        common::models::DatabasesResponse,
        common::models::DatabaseStatus,
        common::models::DatabasesInfoResponse,
        common::models::ConnectionStatus,
        common::models::ConnectionTestResponse,
        common::models::SchemaRef,
        common::models::SchemasResponse,
        common::models::TableRef,
        common::models::TablesResponse,
        common::models::ColumnDescriptor,
        common::models::TableInfo,
        common::models::DataMetadata,
        common::models::TableDataResponse,
        common::models::ClearCacheResponse,
        common::response::ErrorResponse,
        common::response::ApiError,
        common::response::ResponseMeta,
        handlers::HealthResponse,
    )),
    tags(
        (name = "databases", description = "数据库发现与连接测试"),
        (name = "metadata", description = "schema、表与表结构"),
        (name = "data", description = "表数据读取"),
        (name = "legacy", description = "绑定默认库的旧接口"),
        (name = "maintenance", description = "缓存维护"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 初始化日志追踪
    init_tracing(config.log_format);

    let databases = DatabaseRegistry::from_env().context("数据库配置无效")?;
    info!(keys = ?databases.available_keys(), "已加载数据库配置");

    // 创建应用状态（连接池按需建立）
    let state = AppState::new(config.clone(), databases, Arc::new(PgConnector));
    let pool_manager = Arc::clone(&state.pool_manager);

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    let released = pool_manager.release_all().await;
    info!(released, "服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，正在关闭");
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
