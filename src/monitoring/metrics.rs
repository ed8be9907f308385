use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

use crate::core::types::ConsumerState;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();

    // Consumer side, labelled by queue
    static ref MESSAGES_CONSUMED_COUNTER: CounterVec = CounterVec::new(
        Opts::new(
            "trend_pipeline_messages_consumed_total",
            "Total messages delivered to this worker"
        ),
        &["queue"]
    ).unwrap();
    static ref MESSAGES_ACKED_COUNTER: CounterVec = CounterVec::new(
        Opts::new(
            "trend_pipeline_messages_acked_total",
            "Total messages acknowledged after processing or dropping"
        ),
        &["queue"]
    ).unwrap();
    static ref MESSAGES_REQUEUED_COUNTER: CounterVec = CounterVec::new(
        Opts::new(
            "trend_pipeline_messages_requeued_total",
            "Total messages handed back to the broker for redelivery"
        ),
        &["queue"]
    ).unwrap();
    // `reason` is bounded: not_found, unprocessable, external_fetch, other
    static ref MESSAGES_DROPPED_COUNTER: CounterVec = CounterVec::new(
        Opts::new(
            "trend_pipeline_messages_dropped_total",
            "Total messages acknowledged without being applied"
        ),
        &["queue", "reason"]
    ).unwrap();
    static ref PROCESSING_DURATION_HISTOGRAM: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "trend_pipeline_processing_duration_seconds",
            "Time spent processing a single message in seconds"
        ).buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["queue"]
    ).unwrap();

    // Producer side
    static ref EVENTS_PUBLISHED_COUNTER: CounterVec = CounterVec::new(
        Opts::new(
            "trend_pipeline_events_published_total",
            "Total events published and confirmed by the broker"
        ),
        &["queue"]
    ).unwrap();
    static ref PUBLISH_FAILURES_COUNTER: CounterVec = CounterVec::new(
        Opts::new(
            "trend_pipeline_publish_failures_total",
            "Total publish attempts that could not reach the broker"
        ),
        &["queue"]
    ).unwrap();

    static ref EXTERNAL_FETCH_FAILURES_COUNTER: Counter = Counter::new(
        "trend_pipeline_external_fetch_failures_total",
        "Total external data fetches that failed"
    ).unwrap();
    static ref BROKER_HEALTHY_GAUGE: Gauge = Gauge::new(
        "trend_pipeline_broker_healthy",
        "RabbitMQ connection health status (1=healthy, 0=unhealthy)"
    ).unwrap();
}

static REGISTER: Once = Once::new();

fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
            ("MESSAGES_CONSUMED_COUNTER", Box::new(MESSAGES_CONSUMED_COUNTER.clone())),
            ("MESSAGES_ACKED_COUNTER", Box::new(MESSAGES_ACKED_COUNTER.clone())),
            ("MESSAGES_REQUEUED_COUNTER", Box::new(MESSAGES_REQUEUED_COUNTER.clone())),
            ("MESSAGES_DROPPED_COUNTER", Box::new(MESSAGES_DROPPED_COUNTER.clone())),
            ("PROCESSING_DURATION_HISTOGRAM", Box::new(PROCESSING_DURATION_HISTOGRAM.clone())),
            ("EVENTS_PUBLISHED_COUNTER", Box::new(EVENTS_PUBLISHED_COUNTER.clone())),
            ("PUBLISH_FAILURES_COUNTER", Box::new(PUBLISH_FAILURES_COUNTER.clone())),
            ("EXTERNAL_FETCH_FAILURES_COUNTER", Box::new(EXTERNAL_FETCH_FAILURES_COUNTER.clone())),
            ("BROKER_HEALTHY_GAUGE", Box::new(BROKER_HEALTHY_GAUGE.clone())),
        ];

        for (name, collector) in collectors {
            REGISTRY
                .register(collector)
                .unwrap_or_else(|e| warn!("Failed to register {}: {}", name, e));
        }
    });
}

/// Point-in-time view of a worker's counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub messages_dropped: u64,
    pub messages_requeued: u64,
    pub uptime_seconds: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub broker_healthy: bool,
}

#[derive(Debug, Clone)]
pub struct Metrics {
    messages_processed: Arc<AtomicU64>,
    messages_dropped: Arc<AtomicU64>,
    messages_requeued: Arc<AtomicU64>,
    start_time: DateTime<Utc>,
    last_message_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    broker_healthy: Arc<RwLock<bool>>,
    consumer_state: Arc<RwLock<ConsumerState>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        register_metrics();

        Self {
            messages_processed: Arc::new(AtomicU64::new(0)),
            messages_dropped: Arc::new(AtomicU64::new(0)),
            messages_requeued: Arc::new(AtomicU64::new(0)),
            start_time: Utc::now(),
            last_message_time: Arc::new(RwLock::new(None)),
            broker_healthy: Arc::new(RwLock::new(false)),
            consumer_state: Arc::new(RwLock::new(ConsumerState::Idle)),
        }
    }

    pub fn record_message_consumed(&self, queue: &str) {
        MESSAGES_CONSUMED_COUNTER.with_label_values(&[queue]).inc();
    }

    pub async fn record_message_acked(&self, queue: &str) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        MESSAGES_ACKED_COUNTER.with_label_values(&[queue]).inc();
        *self.last_message_time.write().await = Some(Utc::now());
    }

    pub fn record_message_requeued(&self, queue: &str) {
        self.messages_requeued.fetch_add(1, Ordering::Relaxed);
        MESSAGES_REQUEUED_COUNTER.with_label_values(&[queue]).inc();
    }

    pub fn record_message_dropped(&self, queue: &str, reason: &str) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        MESSAGES_DROPPED_COUNTER
            .with_label_values(&[queue, reason])
            .inc();
    }

    pub fn record_processing_duration(&self, queue: &str, duration: Duration) {
        PROCESSING_DURATION_HISTOGRAM
            .with_label_values(&[queue])
            .observe(duration.as_secs_f64());
    }

    pub fn record_event_published(&self, queue: &str) {
        EVENTS_PUBLISHED_COUNTER.with_label_values(&[queue]).inc();
    }

    pub fn record_publish_failure(&self, queue: &str) {
        PUBLISH_FAILURES_COUNTER.with_label_values(&[queue]).inc();
    }

    pub fn record_external_fetch_failure(&self) {
        EXTERNAL_FETCH_FAILURES_COUNTER.inc();
    }

    pub async fn set_broker_health(&self, healthy: bool) {
        *self.broker_healthy.write().await = healthy;
        BROKER_HEALTHY_GAUGE.set(if healthy { 1.0 } else { 0.0 });
    }

    pub async fn set_consumer_state(&self, state: ConsumerState) {
        *self.consumer_state.write().await = state;
    }

    pub async fn consumer_state(&self) -> ConsumerState {
        *self.consumer_state.read().await
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_requeued: self.messages_requeued.load(Ordering::Relaxed),
            uptime_seconds: (Utc::now() - self.start_time).num_seconds(),
            last_message_at: *self.last_message_time.read().await,
            broker_healthy: *self.broker_healthy.read().await,
        }
    }

    pub fn get_prometheus_metrics() -> Result<String, Box<dyn std::error::Error>> {
        register_metrics();
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
