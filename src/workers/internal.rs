use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::EventHandler;
use crate::core::types::{EventKind, EventMessage, TitleRecord};
use crate::error::{PipelineError, Result};
use crate::store::RecordStore;

/// Counts views. Each `VIEW` delivery adds exactly one to the record's
/// internal view count, so redeliveries count again.
pub struct ViewCountHandler {
    store: Arc<dyn RecordStore>,
}

impl ViewCountHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for ViewCountHandler {
    fn name(&self) -> &'static str {
        "internal-worker"
    }

    async fn handle(&self, message: &EventMessage) -> Result<TitleRecord> {
        if message.event_type != EventKind::View {
            return Err(PipelineError::UnprocessableMessage(format!(
                "{} is not handled on the view queue",
                message.event_type
            )));
        }

        let record = self
            .store
            .update(message.tmdb_id, Box::new(|record: &mut TitleRecord| record.record_view()))
            .await?;

        info!(
            "Incremented views for TMDB ID {} to {}",
            record.tmdb_id, record.internal_views_count
        );
        Ok(record)
    }
}
