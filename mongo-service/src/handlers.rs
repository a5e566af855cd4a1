//! Handler模块

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::models::{ConnectRequest, ConnectionDescriptor, DbMutation, DbQuery, InsertOutcome};
use common::response::{Enveloped, ErrorBody, StatusResponse};

use crate::dispatcher::{ActionOutput, Command};
use crate::state::AppState;

/// 建立（或重建）指定连接
///
/// 关闭已有连接后重新打开并探测，失败时该连接不保留任何句柄。
#[utoipa::path(
    post,
    path = "/connect",
    tag = "connections",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "连接成功", body = StatusResponse),
        (status = 400, description = "缺少参数或未配置连接串", body = StatusResponse),
        (status = 500, description = "连接或探测失败", body = StatusResponse)
    )
)]
pub async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, Enveloped> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let identifier = req
        .identifier()
        .ok_or_else(|| AppError::Validation("Connection identifier not specified".into()))?;

    state.registry.reconnect(identifier).await?;
    Ok(Json(StatusResponse::ok()))
}

/// 列出所有已配置的连接
#[utoipa::path(
    get,
    path = "/connections",
    tag = "connections",
    responses(
        (status = 200, description = "连接列表", body = Vec<ConnectionDescriptor>)
    )
)]
pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectionDescriptor>> {
    let connected = state.registry.connected_identifiers().await;
    Json(
        state
            .registry
            .source()
            .descriptors(&|key| connected.contains(key)),
    )
}

/// 只读操作：getDatabases / getCollections / getDocuments
///
/// getDocuments 会一次性读取整个集合，没有分页。
#[utoipa::path(
    get,
    path = "/db",
    tag = "documents",
    params(
        ("action" = String, Query, description = "getDatabases | getCollections | getDocuments"),
        ("connectionIdentifier" = String, Query, description = "连接标识（环境变量名）"),
        ("database" = Option<String>, Query, description = "数据库名"),
        ("collection" = Option<String>, Query, description = "集合名")
    ),
    responses(
        (status = 200, description = "名称列表或文档列表", body = Vec<String>),
        (status = 400, description = "参数缺失或操作无效", body = ErrorBody),
        (status = 500, description = "数据库操作失败", body = ErrorBody)
    )
)]
pub async fn query_db(
    State(state): State<AppState>,
    query: Result<Query<DbQuery>, QueryRejection>,
) -> Result<Json<ActionOutput>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let command = Command::from_query(query)?;
    Ok(Json(state.dispatcher.dispatch(command).await?))
}

/// 写操作：insertDocument / updateDocument / deleteDocument
#[utoipa::path(
    post,
    path = "/db",
    tag = "documents",
    request_body = DbMutation,
    responses(
        (status = 200, description = "写入结果（insert/update/delete 各自的确认与计数）", body = InsertOutcome),
        (status = 400, description = "参数缺失或操作无效", body = ErrorBody),
        (status = 500, description = "数据库操作失败", body = ErrorBody)
    )
)]
pub async fn mutate_db(
    State(state): State<AppState>,
    payload: Result<Json<DbMutation>, JsonRejection>,
) -> Result<Json<ActionOutput>, AppError> {
    let Json(body) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let command = Command::from_mutation(body)?;
    Ok(Json(state.dispatcher.dispatch(command).await?))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/health",
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
        connections: state.registry.connection_count().await,
    })
}

/// 未知路径按请求错误处理
pub async fn route_not_found() -> AppError {
    AppError::Validation("Unknown endpoint".into())
}

/// 路径存在但方法不支持
pub async fn method_not_allowed() -> AppError {
    AppError::Validation("Method not allowed".into())
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// 当前持有的活跃连接数
    pub connections: usize,
}
