use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{RecordStore, TitleMutator};
use crate::core::types::TitleRecord;
use crate::error::{PipelineError, Result};

/// In-process record store. Every operation holds one lock, so each update
/// is atomic with respect to all others.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<i64, TitleRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, tmdb_id: i64) -> Result<TitleRecord> {
        let mut records = self.records.lock().await;
        if records.contains_key(&tmdb_id) {
            return Err(PipelineError::AlreadyExists(tmdb_id));
        }

        let record = TitleRecord::new_placeholder(tmdb_id, Utc::now());
        records.insert(tmdb_id, record.clone());
        debug!("Created record for TMDB ID {}", tmdb_id);
        Ok(record)
    }

    async fn get(&self, tmdb_id: i64) -> Result<TitleRecord> {
        self.records
            .lock()
            .await
            .get(&tmdb_id)
            .cloned()
            .ok_or(PipelineError::NotFound(tmdb_id))
    }

    async fn update(&self, tmdb_id: i64, mutator: TitleMutator) -> Result<TitleRecord> {
        let mut records = self.records.lock().await;
        let stored = records
            .get_mut(&tmdb_id)
            .ok_or(PipelineError::NotFound(tmdb_id))?;

        let mut working = stored.clone();
        mutator(&mut working);

        working.tmdb_id = stored.tmdb_id;
        working.created_at = stored.created_at;
        working.last_updated_at = Utc::now();

        *stored = working.clone();
        Ok(working)
    }

    async fn list(&self) -> Result<Vec<TitleRecord>> {
        let mut all: Vec<TitleRecord> = self.records.lock().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.final_trend_score
                .total_cmp(&a.final_trend_score)
                .then(a.tmdb_id.cmp(&b.tmdb_id))
        });
        Ok(all)
    }
}
