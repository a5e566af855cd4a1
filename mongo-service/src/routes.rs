//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connect", post(handlers::connect))
        .route("/connections", get(handlers::list_connections))
        .route("/db", get(handlers::query_db).post(handlers::mutate_db))
        .route("/health", get(handlers::health_check))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::route_not_found)
}
