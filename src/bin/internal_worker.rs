use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trend_pipeline::{
    monitoring::Metrics,
    store::PgRecordStore,
    workers::{run_worker, ViewCountHandler},
    Config, HttpServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trend_pipeline=info,internal_worker=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting internal view count worker");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {e}");
        e
    })?;

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {e}");
        e
    })?;

    info!("Queue: {}", config.view_queue);
    info!("Prefetch count: {}", config.prefetch_count);

    let store = PgRecordStore::connect(&config.database_url, config.database_pool_size)
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {e}");
            e
        })?;

    let metrics = Arc::new(Metrics::new());
    let cancellation_token = CancellationToken::new();

    let http_server = HttpServer::new(
        "internal-worker",
        &config.view_queue,
        metrics.clone(),
        config.http_port,
    );
    let http_token = cancellation_token.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.start(http_token).await {
            error!("HTTP server error: {e}");
        }
    });

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        warn!("Received Ctrl-C, finishing in-flight message and shutting down...");
        shutdown_token.cancel();
    });

    let handler = Arc::new(ViewCountHandler::new(Arc::new(store)));
    let result = run_worker(
        &config,
        handler,
        &config.view_queue,
        metrics,
        cancellation_token.clone(),
    )
    .await;

    cancellation_token.cancel();
    let shutdown_duration = std::time::Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(shutdown_duration, http_handle).await {
        Ok(Ok(())) => info!("HTTP server stopped gracefully"),
        Ok(Err(e)) => warn!("HTTP server panicked: {e}"),
        Err(_) => warn!("HTTP server did not stop within timeout, forcing abort"),
    }

    match result {
        Ok(()) => {
            info!("Internal worker shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Internal worker exiting: {e}");
            Err(e.into())
        }
    }
}
