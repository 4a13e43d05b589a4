use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use safety_map_api::{app, config, middleware, services::MlGatewayClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Safety Map API v{}", env!("CARGO_PKG_VERSION"));

    let ml_gateway = MlGatewayClient::new(config.ml_service.clone())?;
    if ml_gateway.check_health().await {
        info!(url = %config.ml_service.url, "ML service reachable");
    } else {
        warn!(
            url = %config.ml_service.url,
            "ML service not reachable; heatmaps and risk scores will degrade"
        );
    }

    let addr = config.socket_addr()?;
    let app = app::create_app(config, Arc::new(ml_gateway));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
