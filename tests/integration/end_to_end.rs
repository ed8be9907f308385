use std::sync::Arc;

use crate::helpers::{wait_until, StubFetcher, TestHarness};
use tokio_util::sync::CancellationToken;
use trend_pipeline::broker::{RabbitMQPublisher, RetryPolicy};
use trend_pipeline::core::types::TitleRecord;
use trend_pipeline::monitoring::Metrics;
use trend_pipeline::store::RecordStore;
use trend_pipeline::workers::{run_worker, ScoreHandler, ViewCountHandler};
use trend_pipeline::EventProducer;

#[tokio::test]
#[ignore] // Run with --ignored flag since it requires containers
async fn test_registration_and_views_flow_through_rabbitmq_and_postgres() {
    let harness = TestHarness::new().await.unwrap();
    let config = harness.config();
    let store = Arc::new(harness.store().await.unwrap());
    let metrics = Arc::new(Metrics::new());

    let fetcher = Arc::new(StubFetcher::new());
    fetcher.insert(550, "Fight Club", 8.1, Some("1999-10-15")).await;

    let token = CancellationToken::new();

    let internal = tokio::spawn({
        let config = config.clone();
        let handler = Arc::new(ViewCountHandler::new(store.clone()));
        let metrics = metrics.clone();
        let token = token.clone();
        async move { run_worker(&config, handler, &config.view_queue, metrics, token).await }
    });

    let external = tokio::spawn({
        let config = config.clone();
        let handler = Arc::new(ScoreHandler::new(
            store.clone(),
            fetcher.clone(),
            metrics.clone(),
        ));
        let metrics = Arc::new(Metrics::new());
        let token = token.clone();
        async move {
            run_worker(&config, handler, &config.external_update_queue, metrics, token).await
        }
    });

    let publisher = Arc::new(RabbitMQPublisher::new(
        &config.rabbitmq_url,
        RetryPolicy::from_millis(config.publish_connect_attempts, config.publish_retry_delay_ms),
        metrics.clone(),
    ));
    let producer = EventProducer::new(store.clone(), publisher.clone(), config.queue_names());

    let registration = producer.register(550).await.unwrap();
    assert!(registration.enrichment_queued);

    for _ in 0..30 {
        producer.report_view(550).await.unwrap();
    }

    wait_until(30, "30 views to be counted", || {
        let store = store.clone();
        async move {
            store
                .get(550)
                .await
                .map(|r| r.internal_views_count == 30)
                .unwrap_or(false)
        }
    })
    .await
    .unwrap();

    // Recompute with all 30 views in place
    producer.trigger_external_update(550).await.unwrap();

    wait_until(30, "trend score with 30 views", || {
        let store = store.clone();
        async move {
            store
                .get(550)
                .await
                .map(|r| r.final_trend_score == 6.6)
                .unwrap_or(false)
        }
    })
    .await
    .unwrap();

    let record = store.get(550).await.unwrap();
    assert_eq!(record.title, "Fight Club");
    assert_eq!(record.release_date.as_deref(), Some("1999-10-15"));
    assert_eq!(record.internal_views_count, 30);

    token.cancel();
    internal.await.unwrap().unwrap();
    external.await.unwrap().unwrap();
    publisher.close().await;

    assert_eq!(harness.queue_depth(&config.view_queue).await.unwrap(), 0);
    assert_eq!(
        harness.queue_depth(&config.external_update_queue).await.unwrap(),
        0
    );
}

#[tokio::test]
#[ignore] // Run with --ignored flag since it requires containers
async fn test_events_survive_until_a_worker_starts() {
    let harness = TestHarness::new().await.unwrap();
    let config = harness.config();
    let store = Arc::new(harness.store().await.unwrap());
    let metrics = Arc::new(Metrics::new());

    let publisher = Arc::new(RabbitMQPublisher::new(
        &config.rabbitmq_url,
        RetryPolicy::from_millis(config.publish_connect_attempts, config.publish_retry_delay_ms),
        metrics.clone(),
    ));
    let producer = EventProducer::new(store.clone(), publisher.clone(), config.queue_names());

    producer.register(42).await.unwrap();
    for _ in 0..5 {
        producer.report_view(42).await.unwrap();
    }
    assert_eq!(harness.queue_depth(&config.view_queue).await.unwrap(), 5);

    let token = CancellationToken::new();
    let internal = tokio::spawn({
        let config = config.clone();
        let handler = Arc::new(ViewCountHandler::new(store.clone()));
        let token = token.clone();
        async move { run_worker(&config, handler, &config.view_queue, metrics, token).await }
    });

    wait_until(30, "queued views to be counted", || {
        let store = store.clone();
        async move {
            store
                .get(42)
                .await
                .map(|r| r.internal_views_count == 5)
                .unwrap_or(false)
        }
    })
    .await
    .unwrap();

    token.cancel();
    internal.await.unwrap().unwrap();
    publisher.close().await;
}

#[tokio::test]
#[ignore] // Run with --ignored flag since it requires containers
async fn test_duplicate_registration_in_postgres() {
    let harness = TestHarness::new().await.unwrap();
    let store = harness.store().await.unwrap();

    store.create(8).await.unwrap();
    let duplicate = store.create(8).await;

    assert!(matches!(
        duplicate,
        Err(trend_pipeline::PipelineError::AlreadyExists(8))
    ));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore] // Run with --ignored flag since it requires containers
async fn test_concurrent_view_updates_serialize_on_row_lock() {
    let harness = TestHarness::new().await.unwrap();
    let store = Arc::new(harness.store().await.unwrap());
    store.create(77).await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(77, Box::new(|record: &mut TitleRecord| record.record_view()))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.get(77).await.unwrap().internal_views_count, 20);
}
