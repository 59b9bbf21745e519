//! 按 key 保序测试

use std::sync::Arc;
use std::time::Duration;

use mesh_shared::test_utils::RecordingHandler;
use mesh_shared::topics;

use crate::helpers::*;
use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_same_user_orders_arrive_in_publish_order() {
    let env = TestEnvironment::setup().await;

    let first = env.api.place_order(order_body("b@x.com", 1, false)).await;
    let second = env.api.place_order(order_body("b@x.com", 3, false)).await;

    let records = env.records(topics::ORDER_CREATED).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].partition, records[1].partition);

    let mailer = Arc::new(RecordingHandler::new());
    env.start_member(
        env.settings("mailer-service", "mailer-service-group", &[topics::ORDER_CREATED]),
        mailer.clone(),
    )
    .await;

    assert!(mailer.wait_for(2, Duration::from_secs(5)).await);
    let deliveries = mailer.deliveries();
    assert_eq!(deliveries[0].event.order().order_id, first.order_id);
    assert_eq!(deliveries[0].event.order().quantity, 1);
    assert_eq!(deliveries[1].event.order().order_id, second.order_id);
    assert_eq!(deliveries[1].event.order().quantity, 3);

    env.teardown().await;
}

#[tokio::test]
async fn test_per_partition_order_under_mixed_keys() {
    let env = TestEnvironment::setup().await;

    let mailer = Arc::new(RecordingHandler::new());
    env.start_member(
        env.settings("mailer-service", "mailer-service-group", &[topics::ORDER_CREATED]),
        mailer.clone(),
    )
    .await;

    let users = ["a@x.com", "b@x.com", "c@x.com", "d@x.com"];
    for round in 1..=5 {
        for user in users {
            env.api.place_order(order_body(user, round, false)).await;
        }
    }

    assert!(mailer.wait_for(20, Duration::from_secs(5)).await);
    let deliveries = mailer.deliveries();
    assert_eq!(deliveries.len(), 20);
    assert_partition_order(&deliveries);

    for user in users {
        let quantities: Vec<i64> = deliveries
            .iter()
            .filter(|d| d.event.order().user_email == user)
            .map(|d| d.event.order().quantity)
            .collect();
        assert_eq!(quantities, vec![1, 2, 3, 4, 5], "用户 {user} 的订单乱序");
    }

    env.teardown().await;
}
