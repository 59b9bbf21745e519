//! 真实服务处理器与 topic 引导测试

use std::sync::Arc;
use std::time::Duration;

use mailer_service::MailerHandler;
use mesh_shared::broker::{LogReader, TopicAdmin};
use mesh_shared::test_utils::wait_until;
use mesh_shared::topics::{self, TopicSpec, default_topic_specs};
use topic_init::{ResetOptions, reset_topics};
use user_service::UserHandler;

use crate::helpers::*;
use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_service_handlers_consume_their_topics() {
    let env = TestEnvironment::setup().await;

    let mailer = Arc::new(MailerHandler::new());
    let users = Arc::new(UserHandler::new());
    env.start_member(
        env.settings(
            mailer_service::SERVICE_NAME,
            "mailer-service-group",
            mailer_service::TOPICS,
        ),
        mailer.clone(),
    )
    .await;
    env.start_member(
        env.settings(
            user_service::SERVICE_NAME,
            "user-service-group",
            user_service::TOPICS,
        ),
        users.clone(),
    )
    .await;

    env.api.place_order(order_body("a@x.com", 2, true)).await;
    env.api.place_order(order_body("b@x.com", 1, false)).await;

    assert!(wait_until(Duration::from_secs(5), || mailer.sent() == 2).await);
    assert!(wait_until(Duration::from_secs(5), || users.total_updates() == 3).await);
    assert_eq!(users.updates_for("a@x.com"), 2);
    assert_eq!(users.updates_for("b@x.com"), 1);

    env.teardown().await;
}

#[tokio::test]
async fn test_bootstrap_resets_stale_layout() {
    let env = TestEnvironment::setup().await;
    env.broker
        .create_topic(&TopicSpec::new("__consumer_offsets", 1, 1))
        .await
        .unwrap();
    env.api.place_order(order_body("a@x.com", 1, true)).await;

    let options = ResetOptions {
        keep_existing: false,
        settle: Duration::ZERO,
    };
    let report = reset_topics(env.broker.as_ref(), &default_topic_specs(), &options)
        .await
        .unwrap();

    assert_eq!(report.deleted, vec!["order.created", "user.updated"]);
    assert_eq!(report.created, vec!["order.created", "user.updated"]);
    assert!(env.records(topics::ORDER_CREATED).await.is_empty());
    assert_eq!(env.broker.partition_count(topics::ORDER_CREATED).await.unwrap(), 3);
    assert!(
        env.broker
            .list_topics()
            .await
            .unwrap()
            .contains(&"__consumer_offsets".to_string())
    );

    // 重建之后下单入口照常工作
    env.api.place_order(order_body("a@x.com", 1, false)).await;
    assert_eq!(env.records(topics::ORDER_CREATED).await.len(), 1);

    env.teardown().await;
}
