//! 事件处理器与分发边界
//!
//! 每条投递到消费组成员的记录都经过 `dispatch`：解码失败与处理器失败
//! 都在这里被捕获并记录日志，结果统一为 `DispatchOutcome`，
//! 任何错误都不会越过单条记录的处理边界。

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::broker::Record;
use crate::error::MeshError;
use crate::events::MeshEvent;

/// 处理器错误
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("事件处理失败: {0}")]
    Failed(String),

    #[error(transparent)]
    Shared(#[from] MeshError),
}

/// 投递上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
}

impl EventContext {
    pub fn from_record(record: &Record) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: record.key_str().map(String::from),
        }
    }
}

/// 服务侧业务逻辑
///
/// 只关心成功与否；返回值之外的一切都是副作用。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称，用于日志
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &EventContext, event: &MeshEvent) -> Result<(), HandlerError>;
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Decode,
    HandlerFailed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::HandlerFailed => "handler_failed",
        }
    }
}

/// 单条记录的分发结果；两种结果都会推进位点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed,
    Skipped(SkipReason),
}

/// 解码并调用处理器
pub async fn dispatch(handler: &dyn EventHandler, record: &Record) -> DispatchOutcome {
    info!(
        handler = handler.name(),
        topic = %record.topic,
        partition = record.partition,
        offset = record.offset,
        "收到消息"
    );
    metrics::counter!("mesh_records_consumed_total", "topic" => record.topic.clone())
        .increment(1);

    let event = match MeshEvent::decode(&record.topic, &record.value) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                handler = handler.name(),
                error = %e,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "消息解码失败，跳过"
            );
            return skipped(record, SkipReason::Decode);
        }
    };

    let ctx = EventContext::from_record(record);
    match handler.handle(&ctx, &event).await {
        Ok(()) => DispatchOutcome::Processed,
        Err(e) => {
            error!(
                handler = handler.name(),
                error = %e,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "处理消息失败，跳过"
            );
            skipped(record, SkipReason::HandlerFailed)
        }
    }
}

fn skipped(record: &Record, reason: SkipReason) -> DispatchOutcome {
    metrics::counter!(
        "mesh_records_skipped_total",
        "topic" => record.topic.clone(),
        "reason" => reason.as_str()
    )
    .increment(1);
    DispatchOutcome::Skipped(reason)
}
