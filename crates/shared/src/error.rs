//! 统一错误处理模块
//!
//! 定义 broker、生产者、消费组运行时共用的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum MeshError {
    // ==================== 连接错误 ====================
    /// broker 不可达；启动阶段出现时进程应以非零码退出
    #[error("broker 连接失败: {0}")]
    Connection(String),

    // ==================== 序列化错误 ====================
    #[error("序列化失败: {0}")]
    Serialization(String),

    // ==================== 发布错误 ====================
    #[error("发布消息失败: topic={topic}, 原因={reason}")]
    Publish { topic: String, reason: String },

    // ==================== Topic / 分区错误 ====================
    #[error("topic 已存在: {topic}")]
    TopicAlreadyExists { topic: String },

    #[error("topic 不存在: {topic}")]
    UnknownTopic { topic: String },

    #[error("分区不存在: {topic}[{partition}]")]
    UnknownPartition { topic: String, partition: i32 },

    // ==================== 消费组错误 ====================
    #[error("消费组成员不存在: group={group}, member={member}")]
    UnknownMember { group: String, member: String },

    #[error("成员未持有分区: group={group}, member={member}, partition={topic}[{partition}]")]
    NotPartitionOwner {
        group: String,
        member: String,
        topic: String,
        partition: i32,
    },

    #[error("非法状态迁移: {0}")]
    InvalidState(String),

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 配置 / 参数错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, MeshError>;

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
