//! 单进程订单网格入口

use mesh_shared::{
    config::AppConfig,
    lifecycle::{Supervisor, shutdown_signal},
    observability,
};
use order_mesh::{Mesh, SERVICE_NAME};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    let mesh = Mesh::build(&config).await?;
    let mut supervisor = Supervisor::new(config.consumer.shutdown_grace());

    if let Err(e) = mesh.start(&mut supervisor).await {
        error!(error = %e, "消费组启动失败");
        supervisor.shutdown().await?;
        return Err(e.into());
    }

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("HTTP server listening on {}", config.server_addr());

    let app = mesh.router();
    supervisor.spawn("http-server", move |token| async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
        {
            error!(error = %e, "HTTP server error");
        }
    });

    supervisor.run_until_shutdown(shutdown_signal()).await?;
    info!("Service shutdown complete");
    Ok(())
}
