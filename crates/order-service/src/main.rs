//! 订单服务入口

use std::sync::Arc;
use std::time::Duration;

use mesh_shared::{
    config::AppConfig,
    kafka::KafkaProducer,
    lifecycle::{Supervisor, shutdown_signal},
    observability,
    producer::Producer,
};
use order_service::{AppState, OrderService, routes};
use tokio::net::TcpListener;
use tracing::{error, info};

const SERVICE_NAME: &str = "order-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    // broker 不可达时直接退出，由编排层重启
    let kafka = KafkaProducer::connect(&config.kafka).await?;
    let state = AppState::new(OrderService::new(Producer::new(Arc::new(kafka.clone()))));
    let app = routes::router(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("HTTP server listening on {}", config.server_addr());

    let mut supervisor = Supervisor::new(config.consumer.shutdown_grace());
    supervisor.spawn("http-server", move |token| async move {
        let shutdown = async move { token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "HTTP server error");
        }
    });

    let result = supervisor.run_until_shutdown(shutdown_signal()).await;

    kafka.flush(Duration::from_secs(5));
    info!("Kafka producer disconnected");

    result?;
    info!("Service shutdown complete");
    Ok(())
}
