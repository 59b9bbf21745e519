//! Topic 管理引导
//!
//! 一次性运行：列出现有 topic，删除所有非内部 topic，
//! 按配置重新创建，每一步之后等待集群元数据收敛。

pub mod cli;
pub mod reset;

pub use cli::Cli;
pub use reset::{ResetOptions, ResetReport, reset_topics};

pub const SERVICE_NAME: &str = "topic-init";
