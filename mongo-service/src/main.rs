//! 文档数据库控制台服务
//!
//! 提供文档数据库的管理接口，包括：
//! - 按环境变量名配置的多个连接，惰性建立并复用
//! - 数据库、集合、文档的浏览
//! - 单个文档的增删改

mod client;
mod dispatcher;
mod documents;
mod handlers;
mod registry;
mod routes;
mod source;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "mongo-service";
const DEFAULT_PORT: u16 = 8081;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "文档数据库控制台 API",
        version = "0.1.0",
        description = "连接注册表与文档操作服务"
    ),
    paths(
        handlers::connect,
        handlers::list_connections,
        handlers::query_db,
        handlers::mutate_db,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ActionKind,
        common::models::ConnectRequest,
        common::models::ConnectionDescriptor,
        common::models::DbMutation,
        common::models::InsertOutcome,
        common::models::UpdateOutcome,
        common::models::DeleteOutcome,
        common::response::ErrorBody,
        common::response::StatusResponse,
        handlers::HealthResponse,
    )),
    tags(
        (name = "connections", description = "连接管理端点"),
        (name = "documents", description = "数据库与文档操作端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env.local 优先于 .env，均不覆盖已有环境变量
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    init_tracing();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME, DEFAULT_PORT)
        .context("invalid service configuration")?;

    let state = AppState::new(config.clone());
    let registry = state.registry.clone();

    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    registry.close_all().await;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

/// 初始化日志追踪；`LOG_FORMAT=json` 时输出结构化日志
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "无法监听 Ctrl+C 信号");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "无法监听 SIGTERM 信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("收到停止信号，正在关闭连接");
}
