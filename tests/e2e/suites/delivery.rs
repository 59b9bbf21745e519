//! 投递语义测试：畸形记录跳过与崩溃后重复投递

use std::sync::Arc;
use std::time::Duration;

use mesh_shared::broker::RecordAppender;
use mesh_shared::consumer::MemberState;
use mesh_shared::test_utils::{RecordingHandler, wait_until};
use mesh_shared::topics;

use crate::helpers::*;
use crate::setup::TestEnvironment;

const GROUP: &str = "user-service-group";

#[tokio::test]
async fn test_malformed_record_skipped_and_committed() {
    let env = TestEnvironment::setup().await;

    env.broker
        .append(topics::USER_UPDATED, Some(b"a@x.com"), b"{\"orderId\":")
        .await
        .unwrap();
    env.api.place_order(order_body("a@x.com", 4, true)).await;

    let handler = Arc::new(RecordingHandler::new());
    env.start_member(
        env.settings("user-service", GROUP, &[topics::USER_UPDATED]),
        handler.clone(),
    )
    .await;

    assert!(handler.wait_for(1, Duration::from_secs(5)).await);
    let deliveries = handler.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].ctx.offset, 1);
    assert_eq!(deliveries[0].event.order().quantity, 4);

    assert!(
        env.wait_committed(GROUP, topics::USER_UPDATED, 0, 2, Duration::from_secs(5))
            .await
    );

    env.teardown().await;
}

#[tokio::test]
async fn test_failed_handler_does_not_block_partition() {
    let env = TestEnvironment::setup().await;

    env.api.place_order(order_body("a@x.com", 1, true)).await;
    env.api.place_order(order_body("a@x.com", 2, true)).await;

    let handler = Arc::new(RecordingHandler::failing());
    env.start_member(
        env.settings("user-service", GROUP, &[topics::USER_UPDATED]),
        handler.clone(),
    )
    .await;

    assert!(handler.wait_for(2, Duration::from_secs(5)).await);
    assert!(
        env.wait_committed(GROUP, topics::USER_UPDATED, 0, 2, Duration::from_secs(5))
            .await
    );
    // 处理失败也不会重试
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handler.len(), 2);

    env.teardown().await;
}

#[tokio::test]
async fn test_record_redelivered_after_crash_before_commit() {
    let env = TestEnvironment::setup().await;

    env.api.place_order(order_body("a@x.com", 1, true)).await;

    let stalling = Arc::new(StallingHandler::default());
    let crashed = env
        .start_member(
            env.settings("user-service", GROUP, &[topics::USER_UPDATED]),
            stalling.clone(),
        )
        .await;

    assert!(wait_until(Duration::from_secs(5), || stalling.arrived() == vec![0]).await);

    // 宽限期内处理不完，成员被强制离组，记录未提交
    crashed.stop(Duration::from_millis(50)).await.unwrap();
    assert_eq!(crashed.state(), MemberState::Disconnected);
    assert_eq!(env.committed(GROUP, topics::USER_UPDATED, 0).await, None);

    let replacement = Arc::new(RecordingHandler::new());
    env.start_member(
        env.settings("user-service", GROUP, &[topics::USER_UPDATED]),
        replacement.clone(),
    )
    .await;

    assert!(replacement.wait_for(1, Duration::from_secs(5)).await);
    let deliveries = replacement.deliveries();
    assert_eq!(deliveries[0].ctx.offset, 0);
    assert_eq!(deliveries[0].event.order().user_email, "a@x.com");
    assert_eq!(stalling.arrived(), vec![0]);

    env.teardown().await;
}
