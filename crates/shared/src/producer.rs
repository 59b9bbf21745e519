//! 类型化生产者
//!
//! 每次 `publish` 恰好对应一次 `append`，不做内部重试。
//! 重试由调用方负责：订单 ID 每次发布都会重新生成，重试意味着产生新订单。

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::broker::{Ack, RecordAppender};
use crate::error::{MeshError, Result};
use crate::events::MeshEvent;

/// 面向业务的生产者
///
/// 只依赖 broker 的追加能力，可注入内存 broker 或 Kafka 生产者。
#[derive(Clone)]
pub struct Producer {
    appender: Arc<dyn RecordAppender>,
}

impl Producer {
    pub fn new(appender: Arc<dyn RecordAppender>) -> Self {
        Self { appender }
    }

    /// 将值序列化为 JSON 后发布
    ///
    /// 序列化失败返回 `Serialization`；连接故障保持 `Connection`，
    /// 其余追加失败统一为 `Publish`。
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        key: &str,
        payload: &T,
    ) -> Result<Ack> {
        let value = serde_json::to_vec(payload)?;
        self.publish_raw(topic, key, &value).await
    }

    /// 发布领域事件，topic 与分区键均由事件推导
    pub async fn publish_event(&self, event: &MeshEvent) -> Result<Ack> {
        let value = event.encode()?;
        self.publish_raw(event.topic(), &event.partition_key(), &value)
            .await
    }

    async fn publish_raw(&self, topic: &str, key: &str, value: &[u8]) -> Result<Ack> {
        info!(topic, key, "发布消息");

        let ack = self
            .appender
            .append(topic, Some(key.as_bytes()), value)
            .await
            .map_err(|e| {
                warn!(topic, key, error = %e, "发布消息失败");
                match e {
                    MeshError::Connection(_) => e,
                    other => MeshError::Publish {
                        topic: topic.to_string(),
                        reason: other.to_string(),
                    },
                }
            })?;

        metrics::counter!("mesh_records_published_total", "topic" => topic.to_string())
            .increment(1);
        debug!(
            topic,
            key,
            partition = ack.partition,
            offset = ack.offset,
            "消息已确认"
        );
        Ok(ack)
    }
}
