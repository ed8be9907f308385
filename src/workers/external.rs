use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::EventHandler;
use crate::core::types::{EventMessage, TitleRecord};
use crate::error::{PipelineError, Result};
use crate::monitoring::Metrics;
use crate::store::RecordStore;
use crate::tmdb::TitleFetcher;

/// Refreshes external data and recomputes the trend score for
/// `INITIAL_EXTERNAL_UPDATE` and `EXTERNAL_UPDATE` events.
pub struct ScoreHandler {
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn TitleFetcher>,
    metrics: Arc<Metrics>,
}

impl ScoreHandler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn TitleFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            fetcher,
            metrics,
        }
    }
}

#[async_trait]
impl EventHandler for ScoreHandler {
    fn name(&self) -> &'static str {
        "external-worker"
    }

    async fn handle(&self, message: &EventMessage) -> Result<TitleRecord> {
        if !message.event_type.is_external_update() {
            return Err(PipelineError::UnprocessableMessage(format!(
                "{} is not handled on the external update queue",
                message.event_type
            )));
        }

        let fetched = match self.fetcher.fetch(message.tmdb_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.metrics.record_external_fetch_failure();
                warn!(
                    "External fetch failed for TMDB ID {}, record left unchanged: {}",
                    message.tmdb_id, e
                );
                return Err(match e {
                    PipelineError::ExternalFetch(_) => e,
                    other => PipelineError::ExternalFetch(other.to_string()),
                });
            }
        };

        // View count is read under the store's lock, so a concurrent view
        // increment cannot slip in between read and write
        let record = self
            .store
            .update(
                message.tmdb_id,
                Box::new(move |record: &mut TitleRecord| record.apply_external(&fetched)),
            )
            .await?;

        info!(
            "Updated TMDB ID {} ('{}'): external score {}, views {}, trend {}",
            record.tmdb_id,
            record.title,
            record.external_score,
            record.internal_views_count,
            record.final_trend_score
        );
        Ok(record)
    }
}
