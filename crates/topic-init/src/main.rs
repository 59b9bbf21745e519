//! Topic 初始化入口

use clap::Parser;
use mesh_shared::{config::AppConfig, kafka::KafkaAdmin, observability};
use topic_init::{Cli, SERVICE_NAME, reset_topics};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(SERVICE_NAME)?;
    if let Some(brokers) = &cli.brokers {
        config.kafka.brokers = brokers.clone();
    }

    let mut obs_config = config.observability.clone().with_service_name(&config.service_name);
    obs_config.metrics_enabled = false;
    let _guard = observability::init(&obs_config).await?;

    // 首次元数据往返成功后才视为已连接
    let admin = match KafkaAdmin::connect(&config.kafka).await {
        Ok(admin) => admin,
        Err(e) => {
            error!(brokers = %config.kafka.brokers, error = %e, "Failed to connect to Kafka");
            return Err(e.into());
        }
    };
    info!(brokers = %config.kafka.brokers, "Connected to Kafka");

    match reset_topics(&admin, &config.topics, &cli.options()).await {
        Ok(report) => {
            info!(created = ?report.created, kept = ?report.kept, "Topic bootstrap complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Error handling Kafka topics");
            Err(e.into())
        }
    }
}
