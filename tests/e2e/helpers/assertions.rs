//! 通用断言

use std::collections::{HashMap, HashSet};

use mesh_shared::broker::TopicPartition;
use mesh_shared::test_utils::Delivery;

/// 每个分区的投递位点严格递增
pub fn assert_partition_order(deliveries: &[Delivery]) {
    let mut last: HashMap<TopicPartition, i64> = HashMap::new();
    for d in deliveries {
        let tp = TopicPartition::new(d.ctx.topic.clone(), d.ctx.partition);
        if let Some(prev) = last.insert(tp.clone(), d.ctx.offset) {
            assert!(
                d.ctx.offset > prev,
                "分区 {tp} 投递乱序: {prev} 之后是 {}",
                d.ctx.offset
            );
        }
    }
}

/// 投递涉及的分区集合
pub fn partitions_of(deliveries: &[Delivery]) -> HashSet<i32> {
    deliveries.iter().map(|d| d.ctx.partition).collect()
}
