//! 测试环境管理
//!
//! 一个内存 broker、挂在其上的下单入口，以及测试过程中启动的所有消费组成员。

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use mesh_shared::broker::{LogReader, MemoryBroker, Record, TopicPartition};
use mesh_shared::consumer::{ConsumerSettings, GroupMember};
use mesh_shared::handler::EventHandler;
use mesh_shared::producer::Producer;
use mesh_shared::test_utils::{fast_settings, memory_broker};
use order_service::{AppState, OrderService, routes};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::helpers::ApiClient;

pub struct TestEnvironment {
    pub broker: Arc<MemoryBroker>,
    pub api: ApiClient,
    shutdown: CancellationToken,
    members: Mutex<Vec<GroupMember<MemoryBroker>>>,
}

impl TestEnvironment {
    /// 默认 topic 布局：order.created 3 分区，user.updated 1 分区
    pub async fn setup() -> Self {
        let broker = memory_broker().await;
        let app: Router = routes::router(AppState::new(OrderService::new(Producer::new(
            broker.clone(),
        ))));

        Self {
            broker,
            api: ApiClient::new(app),
            shutdown: CancellationToken::new(),
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self, client_id: &str, group_id: &str, topics: &[&str]) -> ConsumerSettings {
        fast_settings(client_id, group_id, topics)
    }

    /// 启动一个消费组成员，测试结束时由 `teardown` 停止
    pub async fn start_member(
        &self,
        settings: ConsumerSettings,
        handler: Arc<dyn EventHandler>,
    ) -> GroupMember<MemoryBroker> {
        let member = GroupMember::new(self.broker.clone(), settings, handler);
        member
            .start(&self.shutdown)
            .await
            .expect("消费组成员启动失败");
        self.members.lock().push(member.clone());
        member
    }

    /// topic 所有分区中的全部记录，按分区再按位点排序
    pub async fn records(&self, topic: &str) -> Vec<Record> {
        let partitions = self.broker.partition_count(topic).await.unwrap();
        let mut all = Vec::new();
        for p in 0..partitions {
            let tp = TopicPartition::new(topic, p);
            let batch = self
                .broker
                .fetch(&tp, 0, 10_000, Duration::ZERO)
                .await
                .unwrap();
            all.extend(batch);
        }
        all
    }

    pub async fn committed(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        use mesh_shared::broker::GroupCoordinator;
        self.broker
            .committed_offset(group, &TopicPartition::new(topic, partition))
            .await
            .unwrap()
    }

    /// 轮询等待已提交位点到达 `expected`
    pub async fn wait_committed(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
        expected: i64,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.committed(group, topic, partition).await == Some(expected) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// 停止所有仍在运行的成员
    pub async fn teardown(self) {
        let members = std::mem::take(&mut *self.members.lock());
        for member in members {
            member.stop(Duration::from_secs(2)).await.unwrap();
        }
        self.shutdown.cancel();
    }
}
