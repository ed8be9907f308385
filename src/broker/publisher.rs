use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    BasicProperties, Channel,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::connection::{declare_durable_queue, BrokerConnection};
use super::retry::{retry_with_policy, RetryPolicy};
use super::EventPublisher;
use crate::core::types::EventMessage;
use crate::error::{PipelineError, Result};
use crate::monitoring::Metrics;

/// AMQP delivery mode for messages that survive a broker restart
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

struct PublisherChannel {
    connection: BrokerConnection,
    channel: Channel,
    declared_queues: HashSet<String>,
}

/// RabbitMQ publisher for view and external update events.
/// Publishes to the default exchange with the queue name as routing key and
/// waits for the broker's publisher confirm.
pub struct RabbitMQPublisher {
    rabbitmq_url: String,
    retry_policy: RetryPolicy,
    state: Mutex<Option<PublisherChannel>>,
    metrics: Arc<Metrics>,
}

impl RabbitMQPublisher {
    /// Connection is opened on first publish
    pub fn new(rabbitmq_url: &str, retry_policy: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            rabbitmq_url: rabbitmq_url.to_string(),
            retry_policy,
            state: Mutex::new(None),
            metrics,
        }
    }

    async fn open(&self) -> Result<PublisherChannel> {
        let url = self.rabbitmq_url.clone();

        retry_with_policy(self.retry_policy, "RabbitMQ publisher connection", || {
            let url = url.clone();
            async move {
                let connection = BrokerConnection::connect(&url).await?;
                let channel = connection.create_channel().await?;
                channel
                    .confirm_select(ConfirmSelectOptions::default())
                    .await
                    .map_err(|e| {
                        PipelineError::BrokerUnavailable(format!(
                            "Failed to enable publisher confirms: {e}"
                        ))
                    })?;

                Ok::<_, PipelineError>(PublisherChannel {
                    connection,
                    channel,
                    declared_queues: HashSet::new(),
                })
            }
        })
        .await
        .map(|opened| {
            info!("Connected to RabbitMQ for publishing events");
            opened
        })
        .map_err(|e| {
            PipelineError::BrokerUnavailable(format!(
                "Publisher could not connect after {} attempts: {e}",
                self.retry_policy.max_attempts
            ))
        })
    }

    async fn publish_on(state: &mut PublisherChannel, queue: &str, payload: &[u8]) -> Result<()> {
        if !state.declared_queues.contains(queue) {
            declare_durable_queue(&state.channel, queue).await?;
            state.declared_queues.insert(queue.to_string());
        }

        let confirmation = state
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY_MODE),
            )
            .await
            .map_err(|e| PipelineError::BrokerUnavailable(format!("Failed to publish message: {e}")))?
            .await
            .map_err(|e| {
                PipelineError::BrokerUnavailable(format!("Failed to confirm publish: {e}"))
            })?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(PipelineError::BrokerUnavailable(format!(
                "Broker rejected message for queue {queue}"
            )));
        }

        Ok(())
    }

    pub async fn close(&self) {
        if let Some(state) = self.state.lock().await.take() {
            state.connection.close().await;
        }
    }
}

#[async_trait]
impl EventPublisher for RabbitMQPublisher {
    async fn publish(&self, queue: &str, message: &EventMessage) -> Result<()> {
        let payload = message.to_payload()?;
        let mut guard = self.state.lock().await;

        let usable = matches!(guard.as_ref(), Some(state) if state.connection.is_connected());
        if !usable {
            if let Some(stale) = guard.take() {
                stale.connection.close().await;
            }
            match self.open().await {
                Ok(opened) => *guard = Some(opened),
                Err(e) => {
                    self.metrics.record_publish_failure(queue);
                    return Err(e);
                }
            }
        }

        let state = guard.as_mut().ok_or_else(|| {
            PipelineError::BrokerUnavailable("Publisher channel not available".to_string())
        })?;

        match Self::publish_on(state, queue, &payload).await {
            Ok(()) => {
                self.metrics.record_event_published(queue);
                debug!(
                    "Sent {} for TMDB ID {} to {}",
                    message.event_type, message.tmdb_id, queue
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Failed to publish {} for TMDB ID {} to {}: {}",
                    message.event_type, message.tmdb_id, queue, e
                );
                self.metrics.record_publish_failure(queue);
                // Next publish starts from a fresh connection
                if let Some(stale) = guard.take() {
                    stale.connection.close().await;
                }
                Err(e)
            }
        }
    }
}
