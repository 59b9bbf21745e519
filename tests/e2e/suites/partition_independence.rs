//! 分区独立性测试
//!
//! 慢处理器只拖慢自己所在分区的位点推进；成员进出期间同一分区不会被并发处理。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mesh_shared::broker::{RecordAppender, TopicPartition};
use mesh_shared::events::MeshEvent;
use mesh_shared::test_utils::{RecordingHandler, sample_order, wait_until};
use mesh_shared::topics;

use crate::helpers::*;
use crate::setup::TestEnvironment;

const GROUP: &str = "mailer-service-group";
const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_stalled_partition_does_not_hold_back_others() {
    let env = TestEnvironment::setup().await;

    // 无 key 追加按轮询落到三个分区，每个分区两条
    for i in 0..6 {
        let event = MeshEvent::OrderCreated(sample_order(&format!("rr{i}@x.com"), 1));
        env.broker
            .append(topics::ORDER_CREATED, None, &event.encode().unwrap())
            .await
            .unwrap();
    }

    let handler = Arc::new(GatedHandler::new(0));
    env.start_member(
        env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
        handler.clone(),
    )
    .await;

    assert!(wait_until(WAIT, || handler.held() == vec![0]).await);
    assert!(env.wait_committed(GROUP, topics::ORDER_CREATED, 1, 2, WAIT).await);
    assert!(env.wait_committed(GROUP, topics::ORDER_CREATED, 2, 2, WAIT).await);

    // 分区 0 的首条记录仍卡在处理器里，位点没有推进
    assert_eq!(handler.held(), vec![0]);
    assert_eq!(env.committed(GROUP, topics::ORDER_CREATED, 0).await, None);
    assert!(handler.handled().iter().all(|(p, _)| *p != 0));

    handler.release();
    assert!(env.wait_committed(GROUP, topics::ORDER_CREATED, 0, 2, WAIT).await);
    let partition_zero: Vec<i64> = handler
        .handled()
        .into_iter()
        .filter(|(p, _)| *p == 0)
        .map(|(_, offset)| offset)
        .collect();
    assert_eq!(partition_zero, vec![0, 1]);

    env.teardown().await;
}

#[tokio::test]
async fn test_handoff_under_slow_handler_never_overlaps() {
    let env = TestEnvironment::setup().await;

    for i in 0..30 {
        env.api
            .place_order(order_body(&format!("slow{i}@x.com"), 1, false))
            .await;
    }
    let published: HashSet<(i32, i64)> = env
        .records(topics::ORDER_CREATED)
        .await
        .iter()
        .map(|r| (r.partition, r.offset))
        .collect();
    assert_eq!(published.len(), 30);

    // 两个成员共享同一个处理器，跨成员的并发调用也能被统计到
    let handler = Arc::new(RecordingHandler::with_delay(Duration::from_millis(25)));
    let first = env
        .start_member(
            env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
            handler.clone(),
        )
        .await;
    assert!(handler.wait_for(3, WAIT).await);

    let second = env
        .start_member(
            env.settings("mailer-service", GROUP, &[topics::ORDER_CREATED]),
            handler.clone(),
        )
        .await;
    let second_id = second.member_id().to_string();
    assert!(
        wait_until(WAIT, || {
            (0..3).any(|p| {
                env.broker
                    .partition_owner(GROUP, &TopicPartition::new(topics::ORDER_CREATED, p))
                    .as_deref()
                    == Some(second_id.as_str())
            })
        })
        .await,
        "新成员未获得任何分区"
    );

    first.stop(Duration::from_secs(2)).await.unwrap();

    let covered = wait_until(Duration::from_secs(10), || {
        let seen: HashSet<(i32, i64)> = handler
            .deliveries()
            .iter()
            .map(|d| (d.ctx.partition, d.ctx.offset))
            .collect();
        published.is_subset(&seen)
    })
    .await;
    assert!(covered, "部分记录未被处理");

    assert_eq!(handler.overlapping_calls(), 0, "同一分区出现并发处理");

    for p in 0..3 {
        let end = published.iter().filter(|(partition, _)| *partition == p).count() as i64;
        if end == 0 {
            continue;
        }
        assert!(env.wait_committed(GROUP, topics::ORDER_CREATED, p, end, WAIT).await);
    }

    env.teardown().await;
}
