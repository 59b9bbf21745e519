//! 下单入口客户端
//!
//! 直接以 `oneshot` 驱动路由，不占用端口。

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use mesh_shared::events::OrderCreatedEvent;
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Clone)]
pub struct ApiClient {
    app: Router,
}

impl ApiClient {
    pub fn new(app: Router) -> Self {
        Self { app }
    }

    pub async fn post_order(&self, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/orders")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// 下单并断言 201
    pub async fn place_order(&self, body: Value) -> OrderCreatedEvent {
        let (status, value) = self.post_order(body).await;
        assert_eq!(status, StatusCode::CREATED, "下单失败: {value}");
        serde_json::from_value(value).unwrap()
    }
}

/// 标准下单请求体
pub fn order_body(user_email: &str, quantity: i64, send_user_update: bool) -> Value {
    json!({
        "userEmail": user_email,
        "productId": "p1",
        "quantity": quantity,
        "price": 9.99,
        "shippingAddress": "Addr",
        "paymentMethod": "credit_card",
        "sendUserUpdate": send_user_update
    })
}
