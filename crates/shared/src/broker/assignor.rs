//! 分区分配策略
//!
//! 轮询分配：把所有被订阅的分区排序后依次分给排序后的成员，
//! 跳过未订阅该 topic 的成员。结果只依赖成员与订阅集合，
//! 相同输入在任何节点上都得到相同分配。

use std::collections::{BTreeMap, BTreeSet};

use super::TopicPartition;

/// 计算目标分配
///
/// `subscriptions` 为成员 ID 到其订阅 topic 集合的映射；
/// `partitions` 为所有被订阅 topic 的分区（无需预先排序）。
/// 每个分区至多分给一个成员；只要存在订阅了该 topic 的成员，分区就一定被分配。
pub fn round_robin(
    subscriptions: &BTreeMap<String, BTreeSet<String>>,
    partitions: &[TopicPartition],
) -> BTreeMap<String, Vec<TopicPartition>> {
    let members: Vec<&String> = subscriptions.keys().collect();
    let mut result: BTreeMap<String, Vec<TopicPartition>> = members
        .iter()
        .map(|m| ((*m).clone(), Vec::new()))
        .collect();

    if members.is_empty() {
        return result;
    }

    let mut sorted: Vec<&TopicPartition> = partitions.iter().collect();
    sorted.sort();
    sorted.dedup();

    let n = members.len();
    let mut cursor = 0usize;

    for tp in sorted {
        for step in 0..n {
            let idx = (cursor + step) % n;
            let member = members[idx];
            let subscribed = subscriptions
                .get(member)
                .is_some_and(|topics| topics.contains(&tp.topic));

            if subscribed {
                if let Some(owned) = result.get_mut(member) {
                    owned.push(tp.clone());
                }
                cursor = (idx + 1) % n;
                break;
            }
        }
    }

    result
}
