//! 路由配置模块

use axum::{
    Router, middleware,
    routing::{get, post},
};
use mesh_shared::observability::middleware::http_tracing;
use tower_http::trace::TraceLayer;

use crate::{handlers, state::AppState};

/// 构建完整的 HTTP 应用
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/orders", post(handlers::create_order))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn(http_tracing))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
