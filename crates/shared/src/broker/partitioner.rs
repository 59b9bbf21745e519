//! 分区选择
//!
//! 有 key 的记录使用与 Kafka 默认分区器一致的 murmur2 散列，
//! 保证内存 broker 与真实集群对同一 key 选出同一分区；无 key 的记录按 topic 轮询。

use std::sync::atomic::{AtomicU64, Ordering};

const SEED: u32 = 0x9747_b28c;
const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

/// Kafka 的 murmur2 实现（有符号 32 位结果）
pub fn murmur2(data: &[u8]) -> i32 {
    let length = data.len();
    let mut h: u32 = SEED ^ (length as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h as i32
}

/// 有 key 记录的目标分区
pub fn partition_for_key(key: &[u8], partition_count: i32) -> i32 {
    debug_assert!(partition_count > 0);
    let positive = murmur2(key) & 0x7fff_ffff;
    positive % partition_count
}

/// 无 key 记录的轮询计数器
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicU64,
}

impl RoundRobin {
    pub fn next_partition(&self, partition_count: i32) -> i32 {
        debug_assert!(partition_count > 0);
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        (n % partition_count as u64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur2_matches_kafka_reference_values() {
        assert_eq!(murmur2(b"21"), -973_932_308);
        assert_eq!(murmur2(b"foobar"), -790_332_482);
        assert_eq!(murmur2(b"abc"), 479_470_107);
    }

    #[test]
    fn test_same_key_same_partition() {
        for count in 1..=8 {
            let first = partition_for_key(b"a@x.com", count);
            for _ in 0..10 {
                assert_eq!(partition_for_key(b"a@x.com", count), first);
            }
            assert!((0..count).contains(&first));
        }
    }

    #[test]
    fn test_keys_spread_over_partitions() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..100 {
            let key = format!("user_{i}@example.com");
            seen.insert(partition_for_key(key.as_bytes(), 3));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_round_robin_cycles() {
        let rr = RoundRobin::default();
        let picks: Vec<i32> = (0..6).map(|_| rr.next_partition(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }
}
