use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::scoring::trend_score;
use crate::error::{PipelineError, Result};

/// Accepts RFC 3339 timestamps as well as naive ISO-8601 ones (no offset),
/// which are read as UTC.
fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("Invalid timestamp '{raw}': {e}")))
}

/// Kind of event carried on the queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    InitialExternalUpdate,
    ExternalUpdate,
    View,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InitialExternalUpdate => "INITIAL_EXTERNAL_UPDATE",
            EventKind::ExternalUpdate => "EXTERNAL_UPDATE",
            EventKind::View => "VIEW",
        }
    }

    pub fn is_external_update(&self) -> bool {
        matches!(
            self,
            EventKind::InitialExternalUpdate | EventKind::ExternalUpdate
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body published to RabbitMQ, one JSON object per message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub tmdb_id: i64,
    pub event_type: EventKind,
    #[serde(deserialize_with = "deserialize_lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    pub fn new(tmdb_id: i64, event_type: EventKind) -> Self {
        Self {
            tmdb_id,
            event_type,
            timestamp: Utc::now(),
        }
    }

    pub fn view(tmdb_id: i64) -> Self {
        Self::new(tmdb_id, EventKind::View)
    }

    pub fn external_update(tmdb_id: i64) -> Self {
        Self::new(tmdb_id, EventKind::ExternalUpdate)
    }

    pub fn initial_external_update(tmdb_id: i64) -> Self {
        Self::new(tmdb_id, EventKind::InitialExternalUpdate)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(PipelineError::Serde)
    }

    /// Decode a delivery body. Anything that is not a well-formed message
    /// with a known `event_type` is unprocessable.
    pub fn from_payload(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| {
            PipelineError::UnprocessableMessage(format!(
                "Failed to decode event message '{}': {e}",
                String::from_utf8_lossy(data)
            ))
        })
    }
}

/// Persisted title record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TitleRecord {
    pub tmdb_id: i64,
    pub title: String,
    pub release_date: Option<String>,
    pub internal_views_count: i64,
    pub external_score: f64,
    pub final_trend_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl TitleRecord {
    pub fn placeholder_title(tmdb_id: i64) -> String {
        format!("Placeholder Title for ID {tmdb_id}")
    }

    /// Freshly registered record: placeholder name and zero metrics
    pub fn new_placeholder(tmdb_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            tmdb_id,
            title: Self::placeholder_title(tmdb_id),
            release_date: None,
            internal_views_count: 0,
            external_score: 0.0,
            final_trend_score: 0.0,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn record_view(&mut self) {
        self.internal_views_count += 1;
    }

    /// Overwrite the externally sourced fields and recompute the trend score
    /// from the values currently held by this record.
    pub fn apply_external(&mut self, fetched: &FetchedTitle) {
        self.title = fetched.name.clone();
        self.external_score = fetched.external_score;
        if fetched.release_date.is_some() {
            self.release_date = fetched.release_date.clone();
        }
        self.recompute_trend();
    }

    pub fn recompute_trend(&mut self) {
        self.final_trend_score = trend_score(self.external_score, self.internal_views_count);
    }
}

/// Result of the external popularity fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedTitle {
    pub name: String,
    pub external_score: f64,
    pub release_date: Option<String>,
}

/// Names of the two independent queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueNames {
    pub view: String,
    pub external_update: String,
}

impl QueueNames {
    pub fn for_kind(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::View => &self.view,
            EventKind::InitialExternalUpdate | EventKind::ExternalUpdate => &self.external_update,
        }
    }
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            view: crate::config::DEFAULT_VIEW_QUEUE.to_string(),
            external_update: crate::config::DEFAULT_EXTERNAL_UPDATE_QUEUE.to_string(),
        }
    }
}

/// Lifecycle of a queue worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Idle,
    Connecting,
    Consuming,
    Processing,
    Stopped,
}

/// What the worker does with a delivery once the handler is done with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed or permanently unprocessable: remove it from the queue
    Ack,
    /// Transient failure: hand it back to the broker for redelivery
    Requeue,
}
