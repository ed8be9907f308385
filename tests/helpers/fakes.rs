use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use trend_pipeline::broker::EventPublisher;
use trend_pipeline::core::types::{EventMessage, FetchedTitle};
use trend_pipeline::error::{PipelineError, Result};
use trend_pipeline::tmdb::TitleFetcher;

/// Queue stand-in: keeps serialized payloads per queue so tests can deliver
/// them (and redeliver them) by hand.
#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    down: Mutex<bool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_down(&self, down: bool) {
        *self.down.lock().await = down;
    }

    /// Take every pending payload for `queue`, oldest first
    pub async fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .await
            .get_mut(queue)
            .map(|pending| pending.drain(..).collect())
            .unwrap_or_default()
    }

    pub async fn pending(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, queue: &str, message: &EventMessage) -> Result<()> {
        if *self.down.lock().await {
            return Err(PipelineError::BrokerUnavailable(
                "connection refused".to_string(),
            ));
        }

        let payload = message.to_payload()?;
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }
}

/// Fetcher with canned answers. Ids without an answer, or marked failing,
/// behave like a TMDB timeout.
#[derive(Default)]
pub struct StubFetcher {
    titles: Mutex<HashMap<i64, FetchedTitle>>,
    failing: Mutex<HashSet<i64>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, tmdb_id: i64, name: &str, score: f64, release_date: Option<&str>) {
        self.titles.lock().await.insert(
            tmdb_id,
            FetchedTitle {
                name: name.to_string(),
                external_score: score,
                release_date: release_date.map(str::to_string),
            },
        );
    }

    pub async fn fail(&self, tmdb_id: i64) {
        self.failing.lock().await.insert(tmdb_id);
    }
}

#[async_trait]
impl TitleFetcher for StubFetcher {
    async fn fetch(&self, tmdb_id: i64) -> Result<FetchedTitle> {
        if self.failing.lock().await.contains(&tmdb_id) {
            return Err(PipelineError::ExternalFetch(format!(
                "request for {tmdb_id} timed out"
            )));
        }

        self.titles
            .lock()
            .await
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| PipelineError::ExternalFetch(format!("TMDB returned 404 for {tmdb_id}")))
    }
}
