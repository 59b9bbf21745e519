//! 用户服务入口

use std::sync::Arc;

use mesh_shared::{
    config::AppConfig,
    handler::EventHandler,
    kafka::KafkaGroupConsumer,
    lifecycle::{Supervisor, shutdown_signal},
    observability,
};
use tracing::info;
use user_service::{SERVICE_NAME, TOPICS, UserHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        group = %config.kafka.consumer_group,
        brokers = %config.kafka.brokers,
        "Starting {}", SERVICE_NAME
    );

    let consumer = KafkaGroupConsumer::new(&config.kafka)?;
    consumer.subscribe(TOPICS).await?;

    let handler: Arc<dyn EventHandler> = Arc::new(UserHandler::new());
    let mut supervisor = Supervisor::new(config.consumer.shutdown_grace());
    supervisor.spawn("kafka-consumer", move |token| consumer.run(token, handler));

    info!("Listening for messages...");
    supervisor.run_until_shutdown(shutdown_signal()).await?;

    info!("Service shutdown complete");
    Ok(())
}
