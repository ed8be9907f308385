use futures::StreamExt;
use lapin::{message::Delivery, options::*, types::FieldTable, Channel, Consumer};
use tracing::{info, warn};

use super::connection::{declare_durable_queue, BrokerConnection};
use crate::error::{PipelineError, Result};

/// Manual-ack consumer bound to a single durable queue
pub struct QueueConsumer {
    _channel: Channel,
    consumer: Consumer,
    queue_name: String,
}

impl QueueConsumer {
    pub async fn start(
        connection: &BrokerConnection,
        queue_name: &str,
        consumer_tag: &str,
        prefetch_count: u16,
    ) -> Result<Self> {
        let channel = connection.create_channel().await?;

        channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| {
                PipelineError::BrokerUnavailable(format!("Failed to set prefetch count: {e}"))
            })?;

        // Producer and consumer both declare, so startup order does not matter
        declare_durable_queue(&channel, queue_name).await?;

        let consumer = channel
            .basic_consume(
                queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    no_local: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                PipelineError::BrokerUnavailable(format!(
                    "Failed to start consumer for queue {queue_name}: {e}"
                ))
            })?;

        info!(
            "Consumer '{}' started on queue '{}' (prefetch {})",
            consumer_tag, queue_name, prefetch_count
        );

        Ok(Self {
            _channel: channel,
            consumer,
            queue_name: queue_name.to_string(),
        })
    }

    /// Wait for the next delivery. A closed or failed stream means the broker
    /// connection is gone.
    pub async fn next_delivery(&mut self) -> Result<Delivery> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(delivery),
            Some(Err(e)) => Err(PipelineError::BrokerUnavailable(format!(
                "Error receiving message from queue {}: {e}",
                self.queue_name
            ))),
            None => {
                warn!("Consumer stream closed for queue {}", self.queue_name);
                Err(PipelineError::BrokerUnavailable(format!(
                    "Consumer stream closed for queue {}",
                    self.queue_name
                )))
            }
        }
    }

    pub async fn ack(&self, delivery: &Delivery) -> Result<()> {
        delivery
            .acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|e| {
                PipelineError::BrokerUnavailable(format!("Failed to acknowledge message: {e}"))
            })
    }

    /// Negative acknowledgment asking the broker to redeliver
    pub async fn requeue(&self, delivery: &Delivery) -> Result<()> {
        delivery
            .acker
            .nack(BasicNackOptions {
                requeue: true,
                multiple: false,
            })
            .await
            .map_err(|e| PipelineError::BrokerUnavailable(format!("Failed to nack message: {e}")))
    }
}
