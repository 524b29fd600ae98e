use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;
mod config;
mod error;
mod scan;
mod service;
mod websocket;

use crate::config::load_config;
use crate::scan::ScannerRegistry;
use crate::service::ScanningService;
use crate::websocket::WebSocketManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting MediaVault scanning service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(load_config()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        libraries = config.libraries.len(),
        "Configuration loaded"
    );

    let metrics = PrometheusBuilder::new().install_recorder()?;

    // The WebSocket manager is both the progress notifier and the connection registry
    let ws_manager = Arc::new(WebSocketManager::new());
    let scanners = ScannerRegistry::from_config(&config.scanning);
    let (service, receiver) = ScanningService::new(config.clone(), scanners, ws_manager.clone());
    let service = Arc::new(service);

    // Start the scan job processor
    let shutdown = CancellationToken::new();
    let processor = service.processor(receiver, shutdown.clone()).start();

    let app = api::router(service.clone(), ws_manager, metrics);

    // Start the server
    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    info!("Server stopped, shutting down scan pipeline");
    // Stop dispatching before the scan tokens are dropped
    shutdown.cancel();
    service.shutdown();
    processor.shutdown(config.scanning.shutdown_grace()).await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl+C, or when something else cancels `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mediavault_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
