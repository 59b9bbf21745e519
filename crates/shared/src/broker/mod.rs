//! Broker 抽象
//!
//! 以 topic 名寻址的分区化、只追加日志。对外拆成四个能力面：
//! - `RecordAppender`：按 key 选分区并追加记录（生产者只依赖这一面）
//! - `TopicAdmin`：topic 的创建、列举与删除（仅在环境引导时使用）
//! - `LogReader`：按分区与位点长轮询拉取记录
//! - `GroupCoordinator`：消费组成员管理、分区分配、分区所有权与位点提交
//!
//! `MemoryBroker` 在进程内实现全部能力面；对接真实 Kafka 时，
//! 追加与管理由 `kafka` 模块的 rdkafka 适配器提供，组协调交给 Kafka 的组协议。

pub mod assignor;
pub mod memory;
pub mod partitioner;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::topics::TopicSpec;

pub use memory::MemoryBroker;

// ---------------------------------------------------------------------------
// 基础类型
// ---------------------------------------------------------------------------

/// 分区标识 (topic, partition-index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// 分区中的一条记录，追加后不可变
///
/// 内存 broker 与 Kafka 消费者都产出这一拥有所有权的结构，
/// 使记录可以安全地跨 await 点传递给处理函数。
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// 将 key 视为 UTF-8 字符串返回，非 UTF-8 的 key 视为不存在
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }
}

/// 追加确认
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub partition: i32,
    pub offset: i64,
}

/// 成员当前的目标分配
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// 每次成员或订阅集合变化时递增
    pub generation: u64,
    pub partitions: Vec<TopicPartition>,
}

// ---------------------------------------------------------------------------
// 能力面 trait
// ---------------------------------------------------------------------------

/// 记录追加
#[async_trait]
pub trait RecordAppender: Send + Sync {
    /// 追加一条记录
    ///
    /// 有 key 时分区 = murmur2(key) mod 分区数；无 key 时按 topic 轮询。
    async fn append(&self, topic: &str, key: Option<&[u8]>, value: &[u8]) -> Result<Ack>;
}

/// Topic 管理，仅在环境引导阶段调用
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// 已存在同名 topic 时返回 `TopicAlreadyExists`
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()>;

    async fn list_topics(&self) -> Result<Vec<String>>;

    async fn delete_topics(&self, names: &[String]) -> Result<()>;
}

/// 分区日志读取
#[async_trait]
pub trait LogReader: Send + Sync {
    async fn partition_count(&self, topic: &str) -> Result<i32>;

    /// 分区的下一个写入位点
    async fn log_end_offset(&self, tp: &TopicPartition) -> Result<i64>;

    /// 拉取 `from_offset` 及之后的记录（按位点升序，最多 `max_records` 条）
    ///
    /// 没有新记录时最多等待 `max_wait`，期间有追加立即返回；超时返回空集合。
    async fn fetch(
        &self,
        tp: &TopicPartition,
        from_offset: i64,
        max_records: usize,
        max_wait: Duration,
    ) -> Result<Vec<Record>>;
}

/// 消费组协调
///
/// 分配（目标）与所有权（实际）分开维护：成员必须先 `acquire_partition`
/// 才能处理分区，而只有在前一个持有者 `release_partition` 之后才能获得，
/// 因此再均衡期间同一分区也不会被两个成员同时处理。
#[async_trait]
pub trait GroupCoordinator: Send + Sync {
    async fn join_group(&self, group: &str, member: &str, topics: &[String]) -> Result<u64>;

    /// 离组并释放该成员持有的全部分区
    async fn leave_group(&self, group: &str, member: &str) -> Result<()>;

    async fn assignment(&self, group: &str, member: &str) -> Result<Assignment>;

    /// 分区在目标分配中且无其他持有者时返回 true
    async fn acquire_partition(&self, group: &str, member: &str, tp: &TopicPartition)
    -> Result<bool>;

    async fn release_partition(&self, group: &str, member: &str, tp: &TopicPartition)
    -> Result<()>;

    /// 提交下一条待处理记录的位点；提交者必须持有该分区
    async fn commit_offset(
        &self,
        group: &str,
        member: &str,
        tp: &TopicPartition,
        offset: i64,
    ) -> Result<()>;

    async fn committed_offset(&self, group: &str, tp: &TopicPartition) -> Result<Option<i64>>;
}

/// 完整的 broker 能力集合
pub trait Broker: RecordAppender + TopicAdmin + LogReader + GroupCoordinator {}

impl<T> Broker for T where T: RecordAppender + TopicAdmin + LogReader + GroupCoordinator {}
