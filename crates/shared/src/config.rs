//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::topics::{TopicSpec, default_topic_specs};

/// Kafka 连接配置
///
/// `brokers` 为逗号分隔的引导地址列表，`client_id` 用于 broker 侧日志与指标关联。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub client_id: String,
    pub consumer_group: String,
    /// 新消费组的起始位置：earliest 对应 fromBeginning=true
    pub auto_offset_reset: String,
    pub message_timeout_ms: u64,
    pub session_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9094,localhost:9095,localhost:9096".to_string(),
            client_id: "order-mesh".to_string(),
            consumer_group: "order-mesh-group".to_string(),
            auto_offset_reset: "earliest".to_string(),
            message_timeout_ms: 5000,
            session_timeout_ms: 10000,
        }
    }
}

impl KafkaConfig {
    /// 拆分后的 broker 地址列表
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// 是否从最早的保留位点开始消费
    pub fn from_beginning(&self) -> bool {
        self.auto_offset_reset.eq_ignore_ascii_case("earliest")
    }
}

/// 消费组运行时配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// 单次拉取的最大记录数
    pub fetch_max_records: usize,
    /// 长轮询等待上限
    pub fetch_max_wait_ms: u64,
    /// 成员检查分配变化的周期
    pub rebalance_interval_ms: u64,
    /// 优雅关闭时等待在途处理完成的宽限期
    pub shutdown_grace_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            fetch_max_records: 100,
            fetch_max_wait_ms: 500,
            rebalance_interval_ms: 200,
            shutdown_grace_secs: 10,
        }
    }
}

impl ConsumerConfig {
    pub fn fetch_max_wait(&self) -> Duration {
        Duration::from_millis(self.fetch_max_wait_ms)
    }

    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_millis(self.rebalance_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    /// 注入服务名，用于日志与指标的来源标识
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    pub consumer: ConsumerConfig,
    pub observability: ObservabilityConfig,
    /// 管理引导时创建的 topic 集合
    pub topics: Vec<TopicSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "order-mesh".to_string(),
            environment: "development".to_string(),
            server: ServerConfig::default(),
            kafka: KafkaConfig::default(),
            consumer: ConsumerConfig::default(),
            observability: ObservabilityConfig::default(),
            topics: default_topic_specs(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 未显式配置时，Kafka 客户端 ID 取服务名，消费组取 `{服务名}-group`。
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（MESH_ 前缀，双下划线分隔层级，如 MESH_KAFKA__BROKERS -> kafka.brokers）
    /// 5. 服务特定端口环境变量（如 ORDER_SERVICE_PORT）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("MESH_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .set_default("kafka.client_id", service_name)?
            .set_default("kafka.consumer_group", format!("{service_name}-group"))?
            .set_default("observability.service_name", service_name)?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("MESH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = Self::get_service_port_from_env(service_name) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 将 "order-service" 转换为 "ORDER_SERVICE_PORT" 后读取
    fn get_service_port_from_env(service_name: &str) -> Option<u16> {
        std::env::var(Self::service_port_env_var(service_name))
            .ok()
            .and_then(|v| v.parse().ok())
    }

    fn service_port_env_var(service_name: &str) -> String {
        format!("{}_PORT", service_name.to_uppercase().replace('-', "_"))
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
