use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::broker::EventPublisher;
use crate::core::types::{EventMessage, QueueNames, TitleRecord};
use crate::error::Result;
use crate::store::RecordStore;

/// Outcome of a registration
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub record: TitleRecord,
    /// False when the record was stored but the initial external update could
    /// not be published. `trigger_external_update` repairs it.
    pub enrichment_queued: bool,
}

/// Entry point for callers: registers titles and turns view reports and score
/// refresh requests into queue events. Never writes view or score fields.
pub struct EventProducer {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn EventPublisher>,
    queues: QueueNames,
}

impl EventProducer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn EventPublisher>,
        queues: QueueNames,
    ) -> Self {
        Self {
            store,
            publisher,
            queues,
        }
    }

    pub async fn register(&self, tmdb_id: i64) -> Result<Registration> {
        let record = self.store.create(tmdb_id).await?;
        info!("Registered TMDB ID {}", tmdb_id);

        let message = EventMessage::initial_external_update(tmdb_id);
        let enrichment_queued = match self
            .publisher
            .publish(&self.queues.external_update, &message)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "TMDB ID {} registered but initial external update was not queued on {}: {}",
                    tmdb_id, self.queues.external_update, e
                );
                false
            }
        };

        Ok(Registration {
            record,
            enrichment_queued,
        })
    }

    pub async fn report_view(&self, tmdb_id: i64) -> Result<()> {
        self.store.get(tmdb_id).await?;
        self.publisher
            .publish(&self.queues.view, &EventMessage::view(tmdb_id))
            .await
    }

    pub async fn trigger_external_update(&self, tmdb_id: i64) -> Result<()> {
        self.store.get(tmdb_id).await?;
        self.publisher
            .publish(
                &self.queues.external_update,
                &EventMessage::external_update(tmdb_id),
            )
            .await
    }

    /// Every record, highest trend score first
    pub async fn list_titles(&self) -> Result<Vec<TitleRecord>> {
        self.store.list().await
    }
}
