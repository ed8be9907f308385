use std::sync::Arc;

use crate::helpers::{InMemoryBroker, StubFetcher};
use trend_pipeline::core::types::{Disposition, EventKind, EventMessage, QueueNames};
use trend_pipeline::error::PipelineError;
use trend_pipeline::monitoring::Metrics;
use trend_pipeline::store::{MemoryRecordStore, RecordStore};
use trend_pipeline::workers::{process_delivery, EventHandler, ScoreHandler, ViewCountHandler};
use trend_pipeline::EventProducer;

struct Pipeline {
    producer: EventProducer,
    broker: Arc<InMemoryBroker>,
    store: Arc<MemoryRecordStore>,
    fetcher: Arc<StubFetcher>,
    views: ViewCountHandler,
    scores: ScoreHandler,
    metrics: Metrics,
    queues: QueueNames,
}

impl Pipeline {
    fn new() -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(MemoryRecordStore::new());
        let fetcher = Arc::new(StubFetcher::new());
        let queues = QueueNames::default();

        Self {
            producer: EventProducer::new(store.clone(), broker.clone(), queues.clone()),
            views: ViewCountHandler::new(store.clone()),
            scores: ScoreHandler::new(store.clone(), fetcher.clone(), Arc::new(Metrics::new())),
            broker,
            store,
            fetcher,
            metrics: Metrics::new(),
            queues,
        }
    }

    /// Deliver everything pending on `queue` to `handler`
    async fn deliver(&self, queue: &str, handler: &dyn EventHandler) -> Vec<Disposition> {
        let mut dispositions = Vec::new();
        for payload in self.broker.drain(queue).await {
            dispositions.push(process_delivery(handler, queue, &payload, &self.metrics).await);
        }
        dispositions
    }

    async fn deliver_views(&self) -> Vec<Disposition> {
        self.deliver(&self.queues.view, &self.views).await
    }

    async fn deliver_external(&self) -> Vec<Disposition> {
        self.deliver(&self.queues.external_update, &self.scores).await
    }
}

#[tokio::test]
async fn registration_enriches_placeholder_record() {
    let pipeline = Pipeline::new();
    pipeline
        .fetcher
        .insert(550, "Fight Club", 8.4, Some("1999-10-15"))
        .await;

    let registration = pipeline.producer.register(550).await.unwrap();
    assert!(registration.enrichment_queued);
    assert_eq!(registration.record.title, "Placeholder Title for ID 550");

    assert_eq!(pipeline.deliver_external().await, vec![Disposition::Ack]);

    let record = pipeline.store.get(550).await.unwrap();
    assert_eq!(record.title, "Fight Club");
    assert_eq!(record.release_date.as_deref(), Some("1999-10-15"));
    assert_eq!(record.external_score, 8.4);
    // 8.4 * 0.7 = 5.88
    assert_eq!(record.final_trend_score, 5.9);
}

#[tokio::test]
async fn views_then_refresh_produce_expected_trend() {
    let pipeline = Pipeline::new();
    pipeline.fetcher.insert(550, "Fight Club", 8.1, None).await;
    pipeline.producer.register(550).await.unwrap();
    pipeline.broker.drain(&pipeline.queues.external_update).await;

    for _ in 0..30 {
        pipeline.producer.report_view(550).await.unwrap();
    }
    let acks = pipeline.deliver_views().await;
    assert_eq!(acks.len(), 30);
    assert!(acks.iter().all(|d| *d == Disposition::Ack));

    pipeline.producer.trigger_external_update(550).await.unwrap();
    pipeline.deliver_external().await;

    let record = pipeline.store.get(550).await.unwrap();
    assert_eq!(record.internal_views_count, 30);
    assert_eq!(record.final_trend_score, 6.6);
}

#[tokio::test]
async fn redelivered_view_counts_every_time() {
    let pipeline = Pipeline::new();
    pipeline.producer.register(12).await.unwrap();

    let payload = EventMessage::view(12).to_payload().unwrap();
    for _ in 0..4 {
        let disposition =
            process_delivery(&pipeline.views, &pipeline.queues.view, &payload, &pipeline.metrics)
                .await;
        assert_eq!(disposition, Disposition::Ack);
    }

    assert_eq!(
        pipeline.store.get(12).await.unwrap().internal_views_count,
        4
    );
}

#[tokio::test]
async fn failed_fetch_is_acked_and_changes_nothing() {
    let pipeline = Pipeline::new();
    pipeline.fetcher.fail(99).await;
    pipeline.producer.register(99).await.unwrap();
    pipeline.producer.report_view(99).await.unwrap();
    pipeline.deliver_views().await;
    let before = pipeline.store.get(99).await.unwrap();

    assert_eq!(pipeline.deliver_external().await, vec![Disposition::Ack]);

    let after = pipeline.store.get(99).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.title, "Placeholder Title for ID 99");
    assert_eq!(after.final_trend_score, 0.0);
}

#[tokio::test]
async fn broker_outage_during_registration_is_repairable() {
    let pipeline = Pipeline::new();
    pipeline.fetcher.insert(7, "Se7en", 8.4, Some("1995-09-22")).await;

    pipeline.broker.set_down(true).await;
    let registration = pipeline.producer.register(7).await.unwrap();
    assert!(!registration.enrichment_queued);
    assert!(matches!(
        pipeline.producer.report_view(7).await,
        Err(PipelineError::BrokerUnavailable(_))
    ));
    assert_eq!(pipeline.broker.pending(&pipeline.queues.external_update).await, 0);

    pipeline.broker.set_down(false).await;
    pipeline.producer.trigger_external_update(7).await.unwrap();
    pipeline.deliver_external().await;

    assert_eq!(pipeline.store.get(7).await.unwrap().title, "Se7en");
}

#[tokio::test]
async fn messages_on_the_wrong_queue_are_dropped() {
    let pipeline = Pipeline::new();
    pipeline.producer.register(3).await.unwrap();

    // An external update routed to the view worker
    let stray = EventMessage::new(3, EventKind::ExternalUpdate)
        .to_payload()
        .unwrap();
    let disposition =
        process_delivery(&pipeline.views, &pipeline.queues.view, &stray, &pipeline.metrics).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(pipeline.store.get(3).await.unwrap().internal_views_count, 0);
}

#[tokio::test]
async fn list_titles_orders_by_trend() {
    let pipeline = Pipeline::new();
    pipeline.fetcher.insert(1, "Low", 2.0, None).await;
    pipeline.fetcher.insert(2, "High", 9.0, None).await;
    pipeline.fetcher.insert(3, "Mid", 5.0, None).await;
    for id in [1, 2, 3] {
        pipeline.producer.register(id).await.unwrap();
    }
    pipeline.deliver_external().await;

    let titles: Vec<String> = pipeline
        .producer
        .list_titles()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.title)
        .collect();

    assert_eq!(titles, vec!["High", "Mid", "Low"]);
}
