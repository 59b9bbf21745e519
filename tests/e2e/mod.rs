//! 订单网格端到端测试
//!
//! 全部运行在内存 broker 之上，覆盖：
//! - 下单入口发布 order.created / user.updated
//! - 同一 key 的事件按发布顺序消费
//! - 消费组内的分区覆盖与独占
//! - 畸形记录跳过
//! - 崩溃后的重复投递

pub mod helpers;
pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
