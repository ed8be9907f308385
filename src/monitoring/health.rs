use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metrics::MetricsSnapshot;
use crate::core::types::ConsumerState;

/// Health status reported by a worker process
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub healthy: bool,
    pub worker: String,
    pub queue: String,
    pub state: ConsumerState,
    pub broker_connected: bool,
    pub metrics: MetricsSnapshot,
    pub last_check: DateTime<Utc>,
}

impl WorkerHealth {
    pub fn new(worker: &str, queue: &str, state: ConsumerState, metrics: MetricsSnapshot) -> Self {
        Self {
            healthy: metrics.broker_healthy && state != ConsumerState::Stopped,
            worker: worker.to_string(),
            queue: queue.to_string(),
            state,
            broker_connected: metrics.broker_healthy,
            metrics,
            last_check: Utc::now(),
        }
    }
}
