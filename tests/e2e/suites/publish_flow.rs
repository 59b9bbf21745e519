//! 下单入口发布测试

use axum::http::StatusCode;
use mesh_shared::events::MeshEvent;
use mesh_shared::topics;
use serde_json::json;

use crate::helpers::*;
use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_user_update_published_to_both_topics() {
    let env = TestEnvironment::setup().await;

    let order = env.api.place_order(order_body("a@x.com", 2, true)).await;
    assert!(!order.order_id.is_empty());
    assert_eq!(order.user_email, "a@x.com");

    let created = env.records(topics::ORDER_CREATED).await;
    assert_eq!(created.len(), 1);
    let MeshEvent::OrderCreated(published) =
        MeshEvent::decode(topics::ORDER_CREATED, &created[0].value).unwrap()
    else {
        panic!("order.created 上应为订单事件");
    };
    assert_eq!(published, order);

    let updated = env.records(topics::USER_UPDATED).await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].key_str(), Some("a@x.com"));
    let update = MeshEvent::decode(topics::USER_UPDATED, &updated[0].value).unwrap();
    assert_eq!(update.order(), &order);

    env.teardown().await;
}

#[tokio::test]
async fn test_user_update_requires_email() {
    let env = TestEnvironment::setup().await;

    env.api.place_order(order_body("", 1, true)).await;
    env.api.place_order(order_body("c@x.com", 1, false)).await;

    assert_eq!(env.records(topics::ORDER_CREATED).await.len(), 2);
    assert!(env.records(topics::USER_UPDATED).await.is_empty());

    env.teardown().await;
}

#[tokio::test]
async fn test_rejected_request_publishes_nothing() {
    let env = TestEnvironment::setup().await;

    let (status, body) = env.api.post_order(order_body("a@x.com", 0, true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = env
        .api
        .post_order(json!({ "userEmail": "a@x.com", "quantity": "two" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(env.records(topics::ORDER_CREATED).await.is_empty());
    assert!(env.records(topics::USER_UPDATED).await.is_empty());

    env.teardown().await;
}
