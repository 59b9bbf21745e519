//! 命令行参数

use std::time::Duration;

use clap::Parser;

use crate::reset::ResetOptions;

/// Topic 初始化工具
#[derive(Parser, Debug)]
#[command(name = "topic-init")]
#[command(version, about = "重建订单网格所需的 Kafka topic")]
pub struct Cli {
    /// 保留已有 topic，只创建缺失的
    #[arg(long)]
    pub keep_existing: bool,

    /// 删除与创建之后的等待时间（毫秒）
    #[arg(long, default_value = "5000")]
    pub settle_ms: u64,

    /// 覆盖配置中的 Kafka brokers 地址
    #[arg(long)]
    pub brokers: Option<String>,
}

impl Cli {
    pub fn options(&self) -> ResetOptions {
        ResetOptions {
            keep_existing: self.keep_existing,
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}
