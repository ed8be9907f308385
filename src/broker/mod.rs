pub mod connection;
pub mod consumer;
pub mod publisher;
pub mod retry;

use async_trait::async_trait;

use crate::core::types::EventMessage;
use crate::error::Result;

pub use connection::BrokerConnection;
pub use consumer::QueueConsumer;
pub use publisher::RabbitMQPublisher;
pub use retry::{retry_with_policy, RetryPolicy};

/// Durable, at-least-once delivery of an event to a named queue
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns once the broker has accepted the message.
    async fn publish(&self, queue: &str, message: &EventMessage) -> Result<()>;
}
