use lapin::{options::*, types::FieldTable, Channel, Connection, ConnectionProperties};
use tracing::{debug, error, info};

use super::retry::{retry_with_policy, RetryPolicy};
use crate::error::{PipelineError, Result};

/// Owned RabbitMQ connection. Whoever acquires it is responsible for calling
/// [`BrokerConnection::close`] on every exit path.
pub struct BrokerConnection {
    connection: Connection,
}

impl BrokerConnection {
    /// Single connection attempt
    pub async fn connect(rabbitmq_url: &str) -> Result<Self> {
        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| {
                PipelineError::BrokerUnavailable(format!("Failed to connect to RabbitMQ: {e}"))
            })?;

        debug!("Connected to RabbitMQ");
        Ok(Self { connection })
    }

    /// Startup connection used by the consumers. Exhausting the policy is
    /// fatal for the process.
    pub async fn connect_with_retry(rabbitmq_url: &str, policy: RetryPolicy) -> Result<Self> {
        let url = rabbitmq_url.to_string();

        let connection = retry_with_policy(policy, "RabbitMQ connection", || {
            let url = url.clone();
            async move { Self::connect(&url).await }
        })
        .await
        .map_err(|e| {
            error!(
                "Failed to connect to RabbitMQ after {} attempts: {}",
                policy.max_attempts, e
            );
            PipelineError::FatalStartup {
                attempts: policy.max_attempts,
                reason: e.to_string(),
            }
        })?;

        info!("Connected to RabbitMQ");
        Ok(connection)
    }

    pub async fn create_channel(&self) -> Result<Channel> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| PipelineError::BrokerUnavailable(format!("Failed to create channel: {e}")))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(self) {
        if !self.is_connected() {
            debug!("RabbitMQ connection already closed");
            return;
        }

        match self.connection.close(200, "Normal shutdown").await {
            Ok(()) => info!("Closed RabbitMQ connection"),
            Err(e) => debug!("Error while closing RabbitMQ connection: {}", e),
        }
    }
}

/// Declare a durable, non-exclusive queue (idempotent on the broker side)
pub async fn declare_durable_queue(channel: &Channel, queue_name: &str) -> Result<()> {
    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            PipelineError::BrokerUnavailable(format!("Failed to declare queue {queue_name}: {e}"))
        })?;

    Ok(())
}
