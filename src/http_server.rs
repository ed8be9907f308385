use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use warp::Filter;

use crate::monitoring::{Metrics, WorkerHealth};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Per-worker `/health` and `/metrics` endpoints
pub struct HttpServer {
    worker: &'static str,
    queue: String,
    metrics: Arc<Metrics>,
    port: u16,
}

impl HttpServer {
    pub fn new(worker: &'static str, queue: &str, metrics: Arc<Metrics>, port: u16) -> Self {
        Self {
            worker,
            queue: queue.to_string(),
            metrics,
            port,
        }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone + Send + Sync + 'static
    {
        let worker = self.worker;
        let queue = self.queue.clone();
        let health_metrics = self.metrics.clone();

        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let queue = queue.clone();
                let metrics = health_metrics.clone();
                async move {
                    let health = WorkerHealth::new(
                        worker,
                        &queue,
                        metrics.consumer_state().await,
                        metrics.get_snapshot().await,
                    );
                    let status = if health.healthy {
                        warp::http::StatusCode::OK
                    } else {
                        warp::http::StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, warp::Rejection>(warp::reply::with_status(
                        warp::reply::json(&health),
                        status,
                    ))
                }
            });

        let metrics = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| match Metrics::get_prometheus_metrics() {
                Ok(metrics_text) => {
                    warp::reply::with_header(metrics_text, "content-type", PROMETHEUS_CONTENT_TYPE)
                }
                Err(e) => {
                    error!("Failed to generate Prometheus metrics: {}", e);
                    warp::reply::with_header(
                        "# Unable to generate metrics".to_string(),
                        "content-type",
                        PROMETHEUS_CONTENT_TYPE,
                    )
                }
            });

        health.or(metrics)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })?;

        info!("Starting HTTP server on {}", bound);
        server.await;
        info!("HTTP server stopped");

        Ok(())
    }
}
