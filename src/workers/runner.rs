use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::EventHandler;
use crate::broker::{BrokerConnection, QueueConsumer, RetryPolicy};
use crate::config::Config;
use crate::core::types::{ConsumerState, Disposition, EventMessage};
use crate::error::{PipelineError, Result};
use crate::monitoring::Metrics;

/// Bounded label for the dropped-messages counter
fn drop_reason(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::NotFound(_) => "not_found",
        PipelineError::UnprocessableMessage(_) => "unprocessable",
        PipelineError::ExternalFetch(_) => "external_fetch",
        _ => "other",
    }
}

/// Decode and handle one payload and decide what happens to the delivery.
/// Never fails: every outcome is either an ack or a requeue.
pub async fn process_delivery(
    handler: &dyn EventHandler,
    queue: &str,
    payload: &[u8],
    metrics: &Metrics,
) -> Disposition {
    let message = match EventMessage::from_payload(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping undecodable message on {}: {}", queue, e);
            metrics.record_message_dropped(queue, drop_reason(&e));
            return Disposition::Ack;
        }
    };

    debug!(
        "Received {} for TMDB ID {} on {}",
        message.event_type, message.tmdb_id, queue
    );

    match handler.handle(&message).await {
        Ok(_) => Disposition::Ack,
        Err(e) if e.is_terminal_for_message() => {
            warn!(
                "Dropping {} for TMDB ID {} on {}: {}",
                message.event_type, message.tmdb_id, queue, e
            );
            metrics.record_message_dropped(queue, drop_reason(&e));
            Disposition::Ack
        }
        Err(e) => {
            error!(
                "Failed to process {} for TMDB ID {} on {}, will requeue: {}",
                message.event_type, message.tmdb_id, queue, e
            );
            Disposition::Requeue
        }
    }
}

/// Capped exponential delay applied before handing a failed message back to
/// the broker. Resets after any acked message.
#[derive(Debug, Clone)]
pub struct RequeueBackoff {
    initial: Duration,
    max: Duration,
    consecutive_failures: u32,
}

impl RequeueBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            consecutive_failures: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.requeue_backoff_initial_ms),
            Duration::from_millis(config.requeue_backoff_max_ms),
        )
    }

    /// Register a failure and return how long to wait before requeueing
    pub fn next_delay(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let exponent = self.consecutive_failures.saturating_sub(1).min(31);
        self.initial
            .checked_mul(2u32.pow(exponent))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Single-queue worker. Runs until cancelled or until the broker goes away.
pub struct QueueWorker {
    handler: Arc<dyn EventHandler>,
    queue: String,
    prefetch_count: u16,
    backoff: RequeueBackoff,
    metrics: Arc<Metrics>,
}

impl QueueWorker {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        queue: &str,
        prefetch_count: u16,
        backoff: RequeueBackoff,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            handler,
            queue: queue.to_string(),
            prefetch_count,
            backoff,
            metrics,
        }
    }

    /// Consume until `cancellation_token` fires (Ok) or the stream is lost
    /// (`BrokerUnavailable`). The in-flight message is always finished first.
    pub async fn run(
        &mut self,
        connection: &BrokerConnection,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        let consumer_tag = format!("{}-{}", self.handler.name(), std::process::id());
        let mut consumer =
            QueueConsumer::start(connection, &self.queue, &consumer_tag, self.prefetch_count)
                .await?;

        self.metrics.set_broker_health(true).await;
        self.metrics
            .set_consumer_state(ConsumerState::Consuming)
            .await;
        info!("{} waiting for messages on {}", self.handler.name(), self.queue);

        loop {
            let delivery = tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("{} received shutdown signal", self.handler.name());
                    break;
                }
                delivery = consumer.next_delivery() => delivery?,
            };

            self.metrics.set_consumer_state(ConsumerState::Processing).await;
            self.metrics.record_message_consumed(&self.queue);
            let started = Instant::now();

            let disposition =
                process_delivery(self.handler.as_ref(), &self.queue, &delivery.data, &self.metrics)
                    .await;
            self.metrics
                .record_processing_duration(&self.queue, started.elapsed());

            match disposition {
                Disposition::Ack => {
                    consumer.ack(&delivery).await?;
                    self.metrics.record_message_acked(&self.queue).await;
                    self.backoff.reset();
                }
                Disposition::Requeue => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Requeueing message on {} in {}ms (consecutive failures: {})",
                        self.queue,
                        delay.as_millis(),
                        self.backoff.consecutive_failures()
                    );
                    tokio::select! {
                        _ = cancellation_token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                    consumer.requeue(&delivery).await?;
                    self.metrics.record_message_requeued(&self.queue);
                }
            }

            self.metrics.set_consumer_state(ConsumerState::Consuming).await;
        }

        Ok(())
    }
}

/// Connect, consume until shutdown or broker loss, and close the connection on
/// every exit path. Exhausting the startup retry budget yields `FatalStartup`.
pub async fn run_worker(
    config: &Config,
    handler: Arc<dyn EventHandler>,
    queue: &str,
    metrics: Arc<Metrics>,
    cancellation_token: CancellationToken,
) -> Result<()> {
    metrics.set_consumer_state(ConsumerState::Connecting).await;

    let policy = RetryPolicy::from_millis(config.connect_max_attempts, config.connect_retry_delay_ms);
    let connection = tokio::select! {
        _ = cancellation_token.cancelled() => {
            metrics.set_consumer_state(ConsumerState::Stopped).await;
            return Ok(());
        }
        connection = BrokerConnection::connect_with_retry(&config.rabbitmq_url, policy) => connection,
    };
    let connection = match connection {
        Ok(connection) => connection,
        Err(e) => {
            metrics.set_consumer_state(ConsumerState::Stopped).await;
            return Err(e);
        }
    };

    let mut worker = QueueWorker::new(
        handler,
        queue,
        config.prefetch_count,
        RequeueBackoff::from_config(config),
        metrics.clone(),
    );
    let result = worker.run(&connection, cancellation_token).await;

    connection.close().await;
    metrics.set_broker_health(false).await;
    metrics.set_consumer_state(ConsumerState::Stopped).await;

    if let Err(e) = &result {
        error!("Worker on {} stopped: {}", queue, e);
    }
    result
}
