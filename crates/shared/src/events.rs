//! 事件模型
//!
//! 定义订单网格中流转的领域事件。`order.created` 与 `user.updated` 共用同一份
//! 订单结构，但在类型层面以不同变体区分，解码入口按 topic 选择变体，
//! 失败时返回 `DecodeError` 而不是 panic，保证单条坏消息不会影响消费循环。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::topics;

// ---------------------------------------------------------------------------
// OrderCreatedEvent
// ---------------------------------------------------------------------------

/// 订单创建事件，作为 `order.created` 记录的值以 UTF-8 JSON 编码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    /// 每次发布新生成，重试发布会产生新的订单 ID
    pub order_id: String,
    pub user_email: String,
    pub product_id: String,
    pub quantity: i64,
    pub price: f64,
    pub shipping_address: String,
    pub payment_method: String,
    /// 发布时刻（ISO-8601）
    pub timestamp: DateTime<Utc>,
}

/// 订单的业务字段，不含服务端生成的 ID 与时间戳
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub user_email: String,
    pub product_id: String,
    pub quantity: i64,
    pub price: f64,
    pub shipping_address: String,
    pub payment_method: String,
}

impl OrderCreatedEvent {
    /// 由订单字段构造事件，生成订单 ID 并记录当前时间
    pub fn new(details: OrderDetails) -> Self {
        Self {
            order_id: Uuid::now_v7().simple().to_string(),
            user_email: details.user_email,
            product_id: details.product_id,
            quantity: details.quantity,
            price: details.price,
            shipping_address: details.shipping_address,
            payment_method: details.payment_method,
            timestamp: Utc::now(),
        }
    }

    /// 分区键：同一用户的事件落在同一分区
    pub fn partition_key(&self) -> String {
        partition_key(&self.user_email)
    }
}

/// 计算分区键
///
/// 有邮箱时直接使用邮箱；邮箱为空时退化为当前毫秒时间戳，
/// 此时同一实体的顺序性不再有保证。
pub fn partition_key(user_email: &str) -> String {
    if user_email.is_empty() {
        Utc::now().timestamp_millis().to_string()
    } else {
        user_email.to_string()
    }
}

// ---------------------------------------------------------------------------
// UserUpdatedEvent
// ---------------------------------------------------------------------------

/// 用户更新事件
///
/// 线上格式与 `OrderCreatedEvent` 完全一致，只在类型上区分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserUpdatedEvent(pub OrderCreatedEvent);

impl UserUpdatedEvent {
    pub fn order(&self) -> &OrderCreatedEvent {
        &self.0
    }
}

impl From<OrderCreatedEvent> for UserUpdatedEvent {
    fn from(order: OrderCreatedEvent) -> Self {
        Self(order)
    }
}

// ---------------------------------------------------------------------------
// MeshEvent
// ---------------------------------------------------------------------------

/// 解码失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("未知 topic: {0}")]
    UnknownTopic(String),

    #[error("负载非 UTF-8 编码: {0}")]
    InvalidUtf8(String),

    #[error("负载 JSON 格式错误: {0}")]
    Malformed(String),
}

/// 网格中所有领域事件的标签联合
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    OrderCreated(OrderCreatedEvent),
    UserUpdated(UserUpdatedEvent),
}

impl MeshEvent {
    /// 事件所属 topic
    pub fn topic(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => topics::ORDER_CREATED,
            Self::UserUpdated(_) => topics::USER_UPDATED,
        }
    }

    /// 两种事件共享的订单结构
    pub fn order(&self) -> &OrderCreatedEvent {
        match self {
            Self::OrderCreated(order) => order,
            Self::UserUpdated(update) => update.order(),
        }
    }

    pub fn partition_key(&self) -> String {
        self.order().partition_key()
    }

    /// 编码为 JSON 字节
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::OrderCreated(order) => serde_json::to_vec(order),
            Self::UserUpdated(update) => serde_json::to_vec(update),
        }
    }

    /// 按 topic 解码记录值
    pub fn decode(topic: &str, value: &[u8]) -> Result<Self, DecodeError> {
        let text =
            std::str::from_utf8(value).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))?;

        match topic {
            topics::ORDER_CREATED => serde_json::from_str::<OrderCreatedEvent>(text)
                .map(Self::OrderCreated)
                .map_err(|e| DecodeError::Malformed(e.to_string())),
            topics::USER_UPDATED => serde_json::from_str::<UserUpdatedEvent>(text)
                .map(Self::UserUpdated)
                .map_err(|e| DecodeError::Malformed(e.to_string())),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
