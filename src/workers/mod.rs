pub mod external;
pub mod internal;
pub mod runner;

use async_trait::async_trait;

use crate::core::types::{EventMessage, TitleRecord};
use crate::error::Result;

pub use external::ScoreHandler;
pub use internal::ViewCountHandler;
pub use runner::{process_delivery, run_worker, QueueWorker, RequeueBackoff};

/// Applies one decoded event to the record store
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used for logs, consumer tags and the health endpoint
    fn name(&self) -> &'static str;

    /// Returns the record as committed. Errors for which
    /// `is_terminal_for_message` holds are acked and dropped, all others are
    /// requeued.
    async fn handle(&self, message: &EventMessage) -> Result<TitleRecord>;
}
