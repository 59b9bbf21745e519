//! 进程内 broker
//!
//! 同时实现日志存储与消费组协调，用于单进程部署和测试。
//! 记录与位点只保存在内存中，进程退出即丢失。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use super::partitioner::{RoundRobin, partition_for_key};
use super::{
    Ack, Assignment, GroupCoordinator, LogReader, Record, RecordAppender, TopicAdmin,
    TopicPartition, assignor,
};
use crate::error::{MeshError, Result};
use crate::topics::TopicSpec;

// ---------------------------------------------------------------------------
// 日志存储
// ---------------------------------------------------------------------------

/// 单个分区：写锁串行化追加，`notify` 唤醒长轮询中的拉取方
#[derive(Default)]
struct PartitionLog {
    records: RwLock<Vec<Record>>,
    notify: Notify,
}

impl PartitionLog {
    /// 位点从 0 开始且无空洞，因此位点即下标
    fn read(&self, from_offset: i64, max_records: usize) -> Vec<Record> {
        let records = self.records.read();
        let start = from_offset.max(0) as usize;
        if start >= records.len() {
            return Vec::new();
        }
        records[start..]
            .iter()
            .take(max_records.max(1))
            .cloned()
            .collect()
    }

    fn end_offset(&self) -> i64 {
        self.records.read().len() as i64
    }
}

struct TopicState {
    spec: TopicSpec,
    partitions: Vec<PartitionLog>,
    round_robin: RoundRobin,
}

impl TopicState {
    fn new(spec: TopicSpec) -> Self {
        let partitions = (0..spec.partitions).map(|_| PartitionLog::default()).collect();
        Self {
            spec,
            partitions,
            round_robin: RoundRobin::default(),
        }
    }

    fn partition_count(&self) -> i32 {
        self.spec.partitions
    }
}

// ---------------------------------------------------------------------------
// 消费组状态
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GroupState {
    /// 成员 ID -> 订阅的 topic 集合
    members: BTreeMap<String, BTreeSet<String>>,
    generation: u64,
    /// 目标分配
    targets: BTreeMap<String, Vec<TopicPartition>>,
    /// 实际持有者，每个分区至多一个
    owners: HashMap<TopicPartition, String>,
    /// 已提交位点（下一条待处理记录）
    offsets: HashMap<TopicPartition, i64>,
}

impl GroupState {
    fn subscribes_to(&self, topic: &str) -> bool {
        self.members.values().any(|topics| topics.contains(topic))
    }

    fn ensure_member(&self, group: &str, member: &str) -> Result<()> {
        if self.members.contains_key(member) {
            Ok(())
        } else {
            Err(MeshError::UnknownMember {
                group: group.to_string(),
                member: member.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// 进程内 broker
#[derive(Default)]
pub struct MemoryBroker {
    topics: DashMap<String, Arc<TopicState>>,
    groups: Mutex<HashMap<String, GroupState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Result<Arc<TopicState>> {
        self.topics
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MeshError::UnknownTopic {
                topic: name.to_string(),
            })
    }

    fn partition<'a>(topic: &'a TopicState, tp: &TopicPartition) -> Result<&'a PartitionLog> {
        usize::try_from(tp.partition)
            .ok()
            .and_then(|idx| topic.partitions.get(idx))
            .ok_or_else(|| MeshError::UnknownPartition {
                topic: tp.topic.clone(),
                partition: tp.partition,
            })
    }

    /// 按当前成员与 topic 布局重新计算目标分配
    ///
    /// 目标变化后，失去分区的成员仍持有所有权，直到它主动释放；
    /// 新的目标成员在此之前无法获得该分区。
    fn rebalance(&self, group_id: &str, group: &mut GroupState) {
        let subscribed: BTreeSet<&String> = group.members.values().flatten().collect();

        let mut partitions = Vec::new();
        for topic in subscribed {
            if let Some(state) = self.topics.get(topic.as_str()) {
                partitions.extend(
                    (0..state.partition_count()).map(|p| TopicPartition::new(topic.clone(), p)),
                );
            }
        }

        group.targets = assignor::round_robin(&group.members, &partitions);
        group.generation += 1;

        info!(
            group = group_id,
            generation = group.generation,
            members = group.members.len(),
            partitions = partitions.len(),
            "消费组已再均衡"
        );
    }

    /// 当前持有分区的成员
    pub fn partition_owner(&self, group: &str, tp: &TopicPartition) -> Option<String> {
        self.groups
            .lock()
            .get(group)
            .and_then(|g| g.owners.get(tp).cloned())
    }

    /// 消费组当前成员列表
    pub fn group_members(&self, group: &str) -> Vec<String> {
        self.groups
            .lock()
            .get(group)
            .map(|g| g.members.keys().cloned().collect())
            .unwrap_or_default()
    }

}

#[async_trait]
impl RecordAppender for MemoryBroker {
    async fn append(&self, topic: &str, key: Option<&[u8]>, value: &[u8]) -> Result<Ack> {
        let state = self.topic(topic)?;
        let count = state.partition_count();
        let partition = match key {
            Some(k) => partition_for_key(k, count),
            None => state.round_robin.next_partition(count),
        };

        let log = Self::partition(&state, &TopicPartition::new(topic, partition))?;
        let offset = {
            let mut records = log.records.write();
            let offset = records.len() as i64;
            records.push(Record {
                topic: topic.to_string(),
                partition,
                offset,
                key: key.map(<[u8]>::to_vec),
                value: value.to_vec(),
                timestamp: Utc::now(),
            });
            offset
        };
        log.notify.notify_waiters();

        debug!(topic, partition, offset, "记录已追加");
        Ok(Ack { partition, offset })
    }
}

#[async_trait]
impl TopicAdmin for MemoryBroker {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        if spec.name.is_empty() {
            return Err(MeshError::InvalidArgument {
                field: "name".to_string(),
                message: "topic 名称不能为空".to_string(),
            });
        }
        if spec.partitions < 1 {
            return Err(MeshError::InvalidArgument {
                field: "partitions".to_string(),
                message: format!("分区数必须 >= 1，实际 {}", spec.partitions),
            });
        }
        if spec.replication_factor < 1 {
            return Err(MeshError::InvalidArgument {
                field: "replication_factor".to_string(),
                message: format!("副本因子必须 >= 1，实际 {}", spec.replication_factor),
            });
        }

        match self.topics.entry(spec.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(MeshError::TopicAlreadyExists {
                    topic: spec.name.clone(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(TopicState::new(spec.clone())));
            }
        }

        info!(
            topic = %spec.name,
            partitions = spec.partitions,
            replication_factor = spec.replication_factor,
            "topic 已创建"
        );

        // 先于 topic 存在而订阅它的消费组需要重新分配
        let mut groups = self.groups.lock();
        for (group_id, group) in groups.iter_mut() {
            if group.subscribes_to(&spec.name) {
                self.rebalance(group_id, group);
            }
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn delete_topics(&self, names: &[String]) -> Result<()> {
        if let Some(missing) = names.iter().find(|n| !self.topics.contains_key(n.as_str())) {
            return Err(MeshError::UnknownTopic {
                topic: missing.clone(),
            });
        }

        let removed: Vec<(&String, Arc<TopicState>)> = names
            .iter()
            .filter_map(|name| self.topics.remove(name.as_str()).map(|(_, state)| (name, state)))
            .collect();

        // 先收回所有权并推进代数，再唤醒阻塞在已删除分区上的拉取
        {
            let mut groups = self.groups.lock();
            for (group_id, group) in groups.iter_mut() {
                group.offsets.retain(|tp, _| !names.contains(&tp.topic));
                group.owners.retain(|tp, _| !names.contains(&tp.topic));
                if names.iter().any(|n| group.subscribes_to(n)) {
                    self.rebalance(group_id, group);
                }
            }
        }

        for (name, state) in removed {
            for log in &state.partitions {
                log.notify.notify_waiters();
            }
            info!(topic = %name, "topic 已删除");
        }
        Ok(())
    }
}

#[async_trait]
impl LogReader for MemoryBroker {
    async fn partition_count(&self, topic: &str) -> Result<i32> {
        Ok(self.topic(topic)?.partition_count())
    }

    async fn log_end_offset(&self, tp: &TopicPartition) -> Result<i64> {
        let state = self.topic(&tp.topic)?;
        Ok(Self::partition(&state, tp)?.end_offset())
    }

    async fn fetch(
        &self,
        tp: &TopicPartition,
        from_offset: i64,
        max_records: usize,
        max_wait: Duration,
    ) -> Result<Vec<Record>> {
        let state = self.topic(&tp.topic)?;
        let log = Self::partition(&state, tp)?;
        let deadline = Instant::now() + max_wait;

        loop {
            // 先注册唤醒再读取，避免读取与等待之间的追加被遗漏
            let notified = log.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = log.read(from_offset, max_records);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }

            // 同名 topic 被删除后重建时，旧日志也视为不存在
            let live = self
                .topics
                .get(tp.topic.as_str())
                .is_some_and(|current| Arc::ptr_eq(current.value(), &state));
            if !live {
                return Err(MeshError::UnknownTopic {
                    topic: tp.topic.clone(),
                });
            }
        }
    }
}

#[async_trait]
impl GroupCoordinator for MemoryBroker {
    async fn join_group(&self, group: &str, member: &str, topics: &[String]) -> Result<u64> {
        let mut groups = self.groups.lock();
        let state = groups.entry(group.to_string()).or_default();
        state
            .members
            .insert(member.to_string(), topics.iter().cloned().collect());
        self.rebalance(group, state);

        info!(group, member, ?topics, "成员已加入消费组");
        Ok(state.generation)
    }

    async fn leave_group(&self, group: &str, member: &str) -> Result<()> {
        let mut groups = self.groups.lock();
        let state = groups.get_mut(group).ok_or_else(|| MeshError::UnknownMember {
            group: group.to_string(),
            member: member.to_string(),
        })?;
        state.ensure_member(group, member)?;

        state.members.remove(member);
        state.owners.retain(|_, owner| owner != member);
        self.rebalance(group, state);

        info!(group, member, "成员已离开消费组");
        Ok(())
    }

    async fn assignment(&self, group: &str, member: &str) -> Result<Assignment> {
        let groups = self.groups.lock();
        let state = groups.get(group).ok_or_else(|| MeshError::UnknownMember {
            group: group.to_string(),
            member: member.to_string(),
        })?;
        state.ensure_member(group, member)?;

        Ok(Assignment {
            generation: state.generation,
            partitions: state.targets.get(member).cloned().unwrap_or_default(),
        })
    }

    async fn acquire_partition(
        &self,
        group: &str,
        member: &str,
        tp: &TopicPartition,
    ) -> Result<bool> {
        let mut groups = self.groups.lock();
        let state = groups.get_mut(group).ok_or_else(|| MeshError::UnknownMember {
            group: group.to_string(),
            member: member.to_string(),
        })?;
        state.ensure_member(group, member)?;

        let targeted = state
            .targets
            .get(member)
            .is_some_and(|owned| owned.contains(tp));
        if !targeted {
            return Ok(false);
        }

        match state.owners.get(tp) {
            Some(owner) if owner != member => Ok(false),
            Some(_) => Ok(true),
            None => {
                state.owners.insert(tp.clone(), member.to_string());
                debug!(group, member, partition = %tp, "分区所有权已获取");
                Ok(true)
            }
        }
    }

    async fn release_partition(
        &self,
        group: &str,
        member: &str,
        tp: &TopicPartition,
    ) -> Result<()> {
        let mut groups = self.groups.lock();
        if let Some(state) = groups.get_mut(group)
            && state.owners.get(tp).is_some_and(|owner| owner == member)
        {
            state.owners.remove(tp);
            debug!(group, member, partition = %tp, "分区所有权已释放");
        }
        Ok(())
    }

    async fn commit_offset(
        &self,
        group: &str,
        member: &str,
        tp: &TopicPartition,
        offset: i64,
    ) -> Result<()> {
        let mut groups = self.groups.lock();
        let not_owner = || MeshError::NotPartitionOwner {
            group: group.to_string(),
            member: member.to_string(),
            topic: tp.topic.clone(),
            partition: tp.partition,
        };

        let state = groups.get_mut(group).ok_or_else(not_owner)?;
        if !state.owners.get(tp).is_some_and(|owner| owner == member) {
            return Err(not_owner());
        }

        state.offsets.insert(tp.clone(), offset);
        Ok(())
    }

    async fn committed_offset(&self, group: &str, tp: &TopicPartition) -> Result<Option<i64>> {
        Ok(self
            .groups
            .lock()
            .get(group)
            .and_then(|g| g.offsets.get(tp).copied()))
    }
}
