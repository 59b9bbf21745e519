//! Topic 常量与布局定义
//!
//! 集中管理所有 topic 名称和默认分区布局，防止字符串散落在各服务中导致拼写不一致。

use serde::{Deserialize, Serialize};

pub const ORDER_CREATED: &str = "order.created";
pub const USER_UPDATED: &str = "user.updated";

/// broker 内部 topic 的前缀（如 `__consumer_offsets`），管理引导时不会删除
pub const INTERNAL_TOPIC_PREFIX: &str = "__";

/// Topic 布局
///
/// 分区数在 topic 生命周期内不可变；副本因子只对真实集群有意义，
/// 内存 broker 仅做校验不做复制。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication_factor: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor,
        }
    }
}

/// 默认布局：order.created 3 分区，user.updated 1 分区，副本因子均为 3
pub fn default_topic_specs() -> Vec<TopicSpec> {
    vec![
        TopicSpec::new(ORDER_CREATED, 3, 3),
        TopicSpec::new(USER_UPDATED, 1, 3),
    ]
}

pub fn is_internal_topic(name: &str) -> bool {
    name.starts_with(INTERNAL_TOPIC_PREFIX)
}
