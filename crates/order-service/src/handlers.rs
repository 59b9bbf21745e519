//! HTTP 请求处理器

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use mesh_shared::events::OrderCreatedEvent;
use serde_json::{Value, json};
use tracing::info;
use validator::Validate;

use crate::dto::OrderRequest;
use crate::error::Result;
use crate::state::AppState;

/// POST /api/v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<OrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedEvent>)> {
    let Json(request) = payload?;
    request.validate()?;

    let order = state.orders.place_order(&request).await?;
    info!(
        order_id = %order.order_id,
        user_update = request.wants_user_update(),
        "订单已创建"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
