//! 消费组分区分配测试

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mesh_shared::broker::TopicPartition;
use mesh_shared::test_utils::{RecordingHandler, wait_until};
use mesh_shared::topics;

use crate::helpers::*;
use crate::setup::TestEnvironment;

const GROUP: &str = "mailer-service-group";

fn owners(env: &TestEnvironment) -> Vec<Option<String>> {
    (0..3)
        .map(|p| {
            env.broker
                .partition_owner(GROUP, &TopicPartition::new(topics::ORDER_CREATED, p))
        })
        .collect()
}

#[tokio::test]
async fn test_two_members_split_three_partitions() {
    let env = TestEnvironment::setup().await;

    let first = Arc::new(RecordingHandler::new());
    let second = Arc::new(RecordingHandler::new());
    let m1 = env
        .start_member(
            env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
            first.clone(),
        )
        .await;
    let m2 = env
        .start_member(
            env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
            second.clone(),
        )
        .await;

    // 每个分区恰有一个持有者，且两个成员都分到分区
    let settled = wait_until(Duration::from_secs(5), || {
        let owners = owners(&env);
        let distinct: HashSet<&String> = owners.iter().flatten().collect();
        owners.iter().all(Option::is_some) && distinct.len() == 2
    })
    .await;
    assert!(settled, "分区分配未收敛: {:?}", owners(&env));

    let owner_ids: HashSet<String> = owners(&env).into_iter().flatten().collect();
    assert!(owner_ids.contains(m1.member_id()));
    assert!(owner_ids.contains(m2.member_id()));

    for i in 0..30 {
        env.api
            .place_order(order_body(&format!("user{i}@x.com"), 1, false))
            .await;
    }

    assert!(
        wait_until(Duration::from_secs(5), || first.len() + second.len() == 30).await,
        "未收到全部 30 条记录"
    );

    // 每条记录只被处理一次，两个成员处理的分区互不重叠
    let mut seen = HashSet::new();
    for d in first.deliveries().iter().chain(second.deliveries().iter()) {
        assert!(seen.insert((d.ctx.partition, d.ctx.offset)), "重复投递: {:?}", d.ctx);
    }
    let p1 = partitions_of(&first.deliveries());
    let p2 = partitions_of(&second.deliveries());
    assert!(p1.is_disjoint(&p2));
    assert_partition_order(&first.deliveries());
    assert_partition_order(&second.deliveries());

    env.teardown().await;
}

#[tokio::test]
async fn test_remaining_member_takes_over_after_leave() {
    let env = TestEnvironment::setup().await;

    let first = Arc::new(RecordingHandler::new());
    let second = Arc::new(RecordingHandler::new());
    let m1 = env
        .start_member(
            env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
            first.clone(),
        )
        .await;
    let m2 = env
        .start_member(
            env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
            second.clone(),
        )
        .await;

    assert!(
        wait_until(Duration::from_secs(5), || {
            owners(&env).iter().flatten().collect::<HashSet<_>>().len() == 2
        })
        .await
    );

    m2.stop(Duration::from_secs(1)).await.unwrap();
    assert_eq!(env.broker.group_members(GROUP), vec![m1.member_id().to_string()]);

    let survivor = m1.member_id().to_string();
    assert!(
        wait_until(Duration::from_secs(5), || {
            owners(&env).iter().all(|o| o.as_deref() == Some(survivor.as_str()))
        })
        .await,
        "剩余成员未接管全部分区"
    );

    let before = second.len();
    for i in 0..9 {
        env.api
            .place_order(order_body(&format!("late{i}@x.com"), 1, false))
            .await;
    }
    assert!(first.wait_for(9, Duration::from_secs(5)).await);
    assert_eq!(second.len(), before);

    env.teardown().await;
}

#[tokio::test]
async fn test_independent_groups_each_receive_every_record() {
    let env = TestEnvironment::setup().await;

    let mailer = Arc::new(RecordingHandler::new());
    let users = Arc::new(RecordingHandler::new());
    env.start_member(
        env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
        mailer.clone(),
    )
    .await;
    env.start_member(
        env.settings(
            "user-service",
            "user-service-group",
            &[topics::USER_UPDATED, topics::ORDER_CREATED],
        ),
        users.clone(),
    )
    .await;

    env.api.place_order(order_body("a@x.com", 2, true)).await;
    env.api.place_order(order_body("e@x.com", 1, false)).await;

    assert!(mailer.wait_for(2, Duration::from_secs(5)).await);
    assert!(users.wait_for(3, Duration::from_secs(5)).await);

    let user_topics: Vec<String> = users.deliveries().iter().map(|d| d.ctx.topic.clone()).collect();
    assert_eq!(
        user_topics.iter().filter(|t| t.as_str() == topics::USER_UPDATED).count(),
        1
    );
    assert!(mailer
        .deliveries()
        .iter()
        .all(|d| d.ctx.topic == topics::ORDER_CREATED));

    env.teardown().await;
}
